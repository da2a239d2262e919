use std::path::PathBuf;
use std::time::Duration;

use crate::carousel::IndexChange;
use crate::deck::Deck;

/// Requests accepted by the controller task. Every state mutation goes
/// through one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum CarouselCommand {
    Next,
    Previous,
    GoTo(usize),
    TogglePlayback,
    SetPlaying(bool),
    /// Swap in a reloaded deck.
    ReplaceDeck(Deck),
    /// Change the autoplay interval, in ms.
    SetInterval(u64),
}

impl CarouselCommand {
    pub fn name(&self) -> &'static str {
        match self {
            CarouselCommand::Next => "next",
            CarouselCommand::Previous => "previous",
            CarouselCommand::GoTo(_) => "go-to",
            CarouselCommand::TogglePlayback => "toggle-playback",
            CarouselCommand::SetPlaying(_) => "set-playing",
            CarouselCommand::ReplaceDeck(_) => "replace-deck",
            CarouselCommand::SetInterval(_) => "set-interval",
        }
    }
}

/// Emitted by an autoplay timer instance. `generation` identifies the
/// instance so ticks from a cancelled timer can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoplayTick {
    pub generation: u64,
}

/// What caused the most recent index change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeCause {
    User,
    Autoplay,
    DeckReplaced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastChange {
    pub change: IndexChange,
    pub cause: ChangeCause,
}

/// Consistent view of the carousel published after every mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct CarouselSnapshot {
    pub deck: Deck,
    pub current_index: Option<usize>,
    pub is_playing: bool,
    pub autoplay_active: bool,
    pub interval: Duration,
    pub last_change: Option<LastChange>,
    /// Bumped on every published change.
    pub revision: u64,
    /// Bumped whenever the deck is replaced.
    pub deck_revision: u64,
}

impl CarouselSnapshot {
    pub fn current_slide(&self) -> Option<&crate::deck::Slide> {
        self.current_index.and_then(|i| self.deck.get(i))
    }
}

/// Decoded slide image ready for upload.
#[derive(Debug, Clone)]
pub struct PreparedImageCpu {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum ImageOutcome {
    Loaded(PreparedImageCpu),
    Failed(String),
}

/// Loader result for one image reference. Slides sharing a reference share
/// the result.
#[derive(Debug, Clone)]
pub struct SlideImage {
    pub reference: String,
    pub outcome: ImageOutcome,
}
