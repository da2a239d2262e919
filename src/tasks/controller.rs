use std::time::Duration;

use anyhow::Result;
use tokio::select;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::carousel::{CarouselState, IndexChange};
use crate::config::CarouselOptions;
use crate::deck::Deck;
use crate::events::{AutoplayTick, CarouselCommand, CarouselSnapshot, ChangeCause, LastChange};
use crate::tasks::autoplay::{AutoplayKey, AutoplayTimer};

/// Owns the carousel state and the autoplay timer.
///
/// Rules:
/// - User commands and timer ticks are applied one at a time, in the order
///   this loop receives them.
/// - After every effective mutation the timer is reconciled against
///   `{playing, interval, deck length}` and a new snapshot is published.
/// - Ticks from a timer generation that is no longer running are dropped.
/// - On cancellation or when the command channel closes, the timer is
///   stopped before returning.
pub async fn run(
    mut commands: mpsc::Receiver<CarouselCommand>,
    snapshots: watch::Sender<CarouselSnapshot>,
    cancel: CancellationToken,
    deck: Deck,
    options: CarouselOptions,
) -> Result<()> {
    let (tick_tx, mut tick_rx) = mpsc::channel::<AutoplayTick>(4);
    let timer = AutoplayTimer::new(tick_tx, cancel.child_token());
    let mut controller = Controller::new(deck, &options, timer, snapshots);
    info!(
        slides = controller.deck.len(),
        playing = controller.state.is_playing(),
        interval_ms = controller.interval.as_millis() as u64,
        "carousel controller started"
    );

    loop {
        select! {
            biased;

            _ = cancel.cancelled() => break,

            maybe_cmd = commands.recv() => match maybe_cmd {
                Some(cmd) => controller.apply(cmd),
                None => {
                    debug!("command channel closed");
                    break;
                }
            },

            Some(tick) = tick_rx.recv() => controller.on_tick(tick),
        }
    }

    controller.shutdown();
    info!("carousel controller stopped");
    Ok(())
}

/// Snapshot for a controller that has not processed anything yet; used to
/// seed the `watch` channel before the task starts.
pub fn initial_snapshot(deck: &Deck, options: &CarouselOptions) -> CarouselSnapshot {
    let state = CarouselState::new(deck.len(), options.auto_play);
    CarouselSnapshot {
        deck: deck.clone(),
        current_index: state.current_index(),
        is_playing: state.is_playing(),
        autoplay_active: state.autoplay_active(),
        interval: options.auto_play_interval(),
        last_change: None,
        revision: 0,
        deck_revision: 0,
    }
}

const SIMULATION_PREALLOC: usize = 4096;

/// Indices autoplay would visit over `ticks` advances, starting at 0.
pub fn simulate_autoplay(deck_len: usize, ticks: usize) -> Vec<usize> {
    let mut state = CarouselState::new(deck_len, true);
    let mut visited = Vec::with_capacity(ticks.saturating_add(1).min(SIMULATION_PREALLOC));
    if let Some(index) = state.current_index() {
        visited.push(index);
    }
    if !state.autoplay_active() {
        return visited;
    }
    for _ in 0..ticks {
        if let Some(change) = state.next() {
            visited.push(change.to);
        }
    }
    visited
}

pub(crate) struct Controller {
    state: CarouselState,
    deck: Deck,
    interval: Duration,
    timer: AutoplayTimer,
    snapshots: watch::Sender<CarouselSnapshot>,
    last_change: Option<LastChange>,
    revision: u64,
    deck_revision: u64,
}

impl Controller {
    pub(crate) fn new(
        deck: Deck,
        options: &CarouselOptions,
        timer: AutoplayTimer,
        snapshots: watch::Sender<CarouselSnapshot>,
    ) -> Self {
        let state =
            CarouselState::new(deck.len(), options.auto_play).with_go_to_policy(options.go_to_policy);
        let mut controller = Self {
            state,
            deck,
            interval: options.auto_play_interval(),
            timer,
            snapshots,
            last_change: None,
            revision: 0,
            deck_revision: 0,
        };
        controller.sync_timer();
        controller.publish();
        controller
    }

    pub(crate) fn apply(&mut self, command: CarouselCommand) {
        debug!(command = command.name(), "carousel command");
        let changed = match command {
            CarouselCommand::Next => {
                let change = self.state.next();
                self.record(change, ChangeCause::User)
            }
            CarouselCommand::Previous => {
                let change = self.state.previous();
                self.record(change, ChangeCause::User)
            }
            CarouselCommand::GoTo(index) => match self.state.go_to(index) {
                Ok(change) => self.record(change, ChangeCause::User),
                Err(err) => {
                    warn!(index, error = %err, "ignoring go-to request");
                    false
                }
            },
            CarouselCommand::TogglePlayback => {
                let playing = self.state.toggle_playback();
                info!(playing, "playback toggled");
                true
            }
            CarouselCommand::SetPlaying(playing) => self.state.set_playing(playing),
            CarouselCommand::ReplaceDeck(deck) => {
                let change = self.state.resize(deck.len());
                info!(
                    previous = self.deck.len(),
                    slides = deck.len(),
                    "deck replaced"
                );
                self.deck = deck;
                self.deck_revision += 1;
                self.record(change, ChangeCause::DeckReplaced);
                true
            }
            CarouselCommand::SetInterval(ms) => {
                if ms == 0 {
                    warn!("ignoring zero autoplay interval");
                    false
                } else {
                    let interval = Duration::from_millis(ms);
                    let changed = interval != self.interval;
                    self.interval = interval;
                    changed
                }
            }
        };

        if changed {
            self.sync_timer();
            self.publish();
        }
    }

    pub(crate) fn on_tick(&mut self, tick: AutoplayTick) {
        if !self.timer.is_current(tick) {
            debug!(generation = tick.generation, "discarding stale autoplay tick");
            return;
        }
        let change = self.state.next();
        if self.record(change, ChangeCause::Autoplay) {
            self.publish();
        }
    }

    pub(crate) fn shutdown(&mut self) {
        self.timer.stop();
    }

    fn record(&mut self, change: Option<IndexChange>, cause: ChangeCause) -> bool {
        match change {
            Some(change) => {
                debug!(
                    from = change.from,
                    to = change.to,
                    wrapped = change.wrapped,
                    ?cause,
                    "slide changed"
                );
                self.last_change = Some(LastChange { change, cause });
                true
            }
            None => false,
        }
    }

    fn sync_timer(&mut self) {
        self.timer.reconcile(AutoplayKey {
            playing: self.state.is_playing(),
            interval: self.interval,
            deck_len: self.state.len(),
        });
    }

    fn publish(&mut self) {
        self.revision += 1;
        self.snapshots.send_replace(CarouselSnapshot {
            deck: self.deck.clone(),
            current_index: self.state.current_index(),
            is_playing: self.state.is_playing(),
            autoplay_active: self.timer.is_running(),
            interval: self.interval,
            last_change: self.last_change,
            revision: self.revision,
            deck_revision: self.deck_revision,
        });
    }
}
