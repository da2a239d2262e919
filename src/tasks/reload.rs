use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher, recommended_watcher};
use tokio::select;
use tokio::sync::mpsc::{self, Sender};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Configuration;
use crate::deck::Deck;
use crate::events::CarouselCommand;

/// Editors tend to write a file in several steps; wait this long after the
/// first event before reloading.
const SETTLE_DELAY: Duration = Duration::from_millis(200);

/// What the controller currently runs with, as far as reloads are concerned.
#[derive(Debug, Clone, PartialEq)]
pub struct ReloadState {
    pub deck: Deck,
    pub interval_ms: u64,
}

impl ReloadState {
    pub fn from_config(cfg: &Configuration, deck: Deck) -> Self {
        Self {
            deck,
            interval_ms: cfg.carousel.auto_play_interval_ms,
        }
    }
}

/// Commands that move the controller from `current` to `next`.
pub fn changes_between(current: &ReloadState, next: &ReloadState) -> Vec<CarouselCommand> {
    let mut commands = Vec::new();
    if current.deck != next.deck {
        commands.push(CarouselCommand::ReplaceDeck(next.deck.clone()));
    }
    if current.interval_ms != next.interval_ms {
        commands.push(CarouselCommand::SetInterval(next.interval_ms));
    }
    commands
}

fn load(config_path: &Path) -> Result<(Configuration, Deck)> {
    let cfg = Configuration::from_yaml_file(config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path.display()))?
        .validated()
        .context("invalid configuration values")?;
    let deck = cfg.load_deck().context("failed to load deck")?;
    Ok((cfg, deck))
}

/// Watches the configuration file (and the external deck file, if any) and
/// forwards deck and interval changes to the controller. Files that fail to
/// load are reported and otherwise ignored.
#[instrument(skip_all, fields(config = %config_path.display()))]
pub async fn run(
    config_path: PathBuf,
    mut state: ReloadState,
    deck_file: Option<PathBuf>,
    to_controller: Sender<CarouselCommand>,
    cancel: CancellationToken,
) -> Result<()> {
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Result<Event>>(128);
    let mut watcher = recommended_watcher(move |res| {
        let _ = watch_tx.blocking_send(res);
    })?;

    let mut watched_dirs: HashSet<PathBuf> = HashSet::new();
    let mut names: HashSet<OsString> = HashSet::new();
    for file in std::iter::once(config_path.clone()).chain(deck_file) {
        watch_file(&mut watcher, &file, &mut watched_dirs, &mut names)?;
    }
    info!(files = names.len(), "watching for configuration changes");

    loop {
        select! {
            _ = cancel.cancelled() => break,

            Some(res) = watch_rx.recv() => {
                let event = match res {
                    Ok(event) => event,
                    Err(err) => {
                        error!("watch error: {err}");
                        continue;
                    }
                };
                if !is_relevant(&event, &names) {
                    continue;
                }
                debug!(kind = ?event.kind, paths = ?event.paths, "configuration file event");

                select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep(SETTLE_DELAY) => {}
                }
                while watch_rx.try_recv().is_ok() {}

                let (cfg, deck) = match load(&config_path) {
                    Ok(loaded) => loaded,
                    Err(err) => {
                        warn!("keeping previous configuration: {err:#}");
                        continue;
                    }
                };
                if let Some(path) = cfg.deck_file_path() {
                    if let Err(err) = watch_file(&mut watcher, &path, &mut watched_dirs, &mut names) {
                        warn!(path = %path.display(), "failed to watch deck file: {err:#}");
                    }
                }

                let next = ReloadState::from_config(&cfg, deck);
                let commands = changes_between(&state, &next);
                if commands.is_empty() {
                    debug!("reload produced no carousel changes");
                }
                for command in commands {
                    info!(command = command.name(), "applying reloaded configuration");
                    if to_controller.send(command).await.is_err() {
                        debug!("controller gone; stopping reload watcher");
                        return Ok(());
                    }
                }
                state = next;
            }
        }
    }
    Ok(())
}

fn watch_file<W: Watcher>(
    watcher: &mut W,
    file: &Path,
    watched_dirs: &mut HashSet<PathBuf>,
    names: &mut HashSet<OsString>,
) -> Result<()> {
    if let Some(name) = file.file_name() {
        names.insert(name.to_os_string());
    }
    // Watch the directory: editors often replace files instead of writing
    // them in place, which drops a watch on the file itself.
    let dir = match file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if watched_dirs.insert(dir.clone()) {
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", dir.display()))?;
    }
    Ok(())
}

fn is_relevant(event: &Event, names: &HashSet<OsString>) -> bool {
    let kind_matters = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    );
    kind_matters
        && event
            .paths
            .iter()
            .filter_map(|p| p.file_name())
            .any(|name| names.contains(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::{Slide, SlideId};

    fn deck(titles: &[&str]) -> Deck {
        let slides = titles
            .iter()
            .enumerate()
            .map(|(i, title)| Slide {
                id: SlideId::Number(i as i64),
                image: format!("{i}.jpg"),
                title: title.to_string(),
                description: String::new(),
            })
            .collect();
        Deck::new(slides, "").unwrap()
    }

    #[test]
    fn unchanged_state_sends_nothing() {
        let state = ReloadState {
            deck: deck(&["a", "b"]),
            interval_ms: 4000,
        };
        assert!(changes_between(&state, &state.clone()).is_empty());
    }

    #[test]
    fn deck_and_interval_changes_become_commands() {
        let current = ReloadState {
            deck: deck(&["a", "b"]),
            interval_ms: 4000,
        };
        let next = ReloadState {
            deck: deck(&["a", "c"]),
            interval_ms: 2500,
        };
        let commands = changes_between(&current, &next);
        assert_eq!(commands.len(), 2);
        assert!(matches!(&commands[0], CarouselCommand::ReplaceDeck(d) if d[1].title == "c"));
        assert_eq!(commands[1], CarouselCommand::SetInterval(2500));
    }

    #[test]
    fn relevance_is_by_file_name() {
        let names: HashSet<OsString> = [OsString::from("carousel.yaml")].into_iter().collect();
        let event = Event::new(EventKind::Modify(notify::event::ModifyKind::Any))
            .add_path(PathBuf::from("/etc/carousel/carousel.yaml"));
        assert!(is_relevant(&event, &names));
        let other = Event::new(EventKind::Modify(notify::event::ModifyKind::Any))
            .add_path(PathBuf::from("/etc/carousel/other.yaml"));
        assert!(!is_relevant(&other, &names));
        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(PathBuf::from("/etc/carousel/carousel.yaml"));
        assert!(!is_relevant(&access, &names));
    }
}
