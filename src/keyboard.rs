//! Keyboard control: arrow keys navigate, space toggles playback.

use tokio::sync::mpsc::{Sender, error::TrySendError};
use tracing::{debug, warn};
use winit::keyboard::{Key, NamedKey};

use crate::events::CarouselCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavKey {
    ArrowLeft,
    ArrowRight,
    Space,
}

impl NavKey {
    pub fn command(self) -> CarouselCommand {
        match self {
            NavKey::ArrowLeft => CarouselCommand::Previous,
            NavKey::ArrowRight => CarouselCommand::Next,
            NavKey::Space => CarouselCommand::TogglePlayback,
        }
    }
}

/// Maps a winit logical key to a navigation key.
pub fn nav_key(key: &Key) -> Option<NavKey> {
    match key {
        Key::Named(NamedKey::ArrowLeft) => Some(NavKey::ArrowLeft),
        Key::Named(NamedKey::ArrowRight) => Some(NavKey::ArrowRight),
        Key::Named(NamedKey::Space) => Some(NavKey::Space),
        Key::Character(c) if c.as_str() == " " => Some(NavKey::Space),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyResponse {
    Ignored,
    /// The key was turned into a command. `suppress_default` asks the host
    /// not to run its own action for the key (space would otherwise scroll
    /// or activate a focused control).
    Handled { suppress_default: bool },
}

/// A mounted listener. Dropping it disposes it.
#[derive(Debug)]
pub struct KeyboardListener {
    commands: Sender<CarouselCommand>,
}

impl KeyboardListener {
    fn handle(&self, key: NavKey) -> KeyResponse {
        let command = key.command();
        match self.commands.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(cmd)) => {
                warn!(command = cmd.name(), "controller busy; dropping key command");
            }
            Err(TrySendError::Closed(cmd)) => {
                debug!(command = cmd.name(), "controller gone; dropping key command");
            }
        }
        KeyResponse::Handled {
            suppress_default: key == NavKey::Space,
        }
    }
}

impl Drop for KeyboardListener {
    fn drop(&mut self) {
        debug!("keyboard listener disposed");
    }
}

/// Holds the single keyboard listener of a mounted carousel.
#[derive(Debug, Default)]
pub struct KeyboardSlot {
    listener: Option<KeyboardListener>,
}

impl KeyboardSlot {
    /// Registers the listener. A second mount while one is registered keeps
    /// the existing listener so each key press produces exactly one command.
    pub fn mount(&mut self, commands: Sender<CarouselCommand>) -> bool {
        if self.listener.is_some() {
            debug!("keyboard listener already mounted");
            return false;
        }
        debug!("keyboard listener mounted");
        self.listener = Some(KeyboardListener { commands });
        true
    }

    pub fn dispose(&mut self) {
        self.listener = None;
    }

    pub fn is_mounted(&self) -> bool {
        self.listener.is_some()
    }

    /// Routes a key press. Key releases must not be passed in.
    pub fn handle(&self, key: Option<NavKey>) -> KeyResponse {
        match (&self.listener, key) {
            (Some(listener), Some(key)) => listener.handle(key),
            _ => KeyResponse::Ignored,
        }
    }
}
