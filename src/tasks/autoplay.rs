use std::time::Duration;

use tokio::select;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::events::AutoplayTick;

/// Everything the autoplay timer depends on. A different key means the
/// running timer is torn down and a fresh one is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoplayKey {
    pub playing: bool,
    pub interval: Duration,
    pub deck_len: usize,
}

impl AutoplayKey {
    pub fn active(&self) -> bool {
        self.playing && self.deck_len > 1 && !self.interval.is_zero()
    }
}

struct RunningTimer {
    generation: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns at most one recurring timer task.
///
/// The task is cancelled and aborted on `stop`, on every key change and on
/// drop, so no timer outlives its owner.
pub struct AutoplayTimer {
    ticks: Sender<AutoplayTick>,
    parent: CancellationToken,
    key: Option<AutoplayKey>,
    running: Option<RunningTimer>,
    next_generation: u64,
}

impl AutoplayTimer {
    pub fn new(ticks: Sender<AutoplayTick>, parent: CancellationToken) -> Self {
        Self {
            ticks,
            parent,
            key: None,
            running: None,
            next_generation: 1,
        }
    }

    /// Destroys and recreates the timer when `key` differs from the last one.
    /// Returns `true` when the timer was reset.
    pub fn reconcile(&mut self, key: AutoplayKey) -> bool {
        if self.key == Some(key) {
            return false;
        }
        self.key = Some(key);
        self.stop();
        if key.active() {
            self.start(key.interval);
        }
        true
    }

    /// Whether `tick` came from the timer that is currently running.
    pub fn is_current(&self, tick: AutoplayTick) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| running.generation == tick.generation)
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn generation(&self) -> Option<u64> {
        self.running.as_ref().map(|running| running.generation)
    }

    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
            running.handle.abort();
            debug!(generation = running.generation, "autoplay timer stopped");
        }
    }

    fn start(&mut self, period: Duration) {
        let generation = self.next_generation;
        self.next_generation += 1;
        let cancel = self.parent.child_token();
        let handle = tokio::spawn(tick_loop(
            generation,
            period,
            self.ticks.clone(),
            cancel.clone(),
        ));
        debug!(
            generation,
            interval_ms = period.as_millis() as u64,
            "autoplay timer started"
        );
        self.running = Some(RunningTimer {
            generation,
            cancel,
            handle,
        });
    }
}

impl Drop for AutoplayTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn tick_loop(
    generation: u64,
    period: Duration,
    ticks: Sender<AutoplayTick>,
    cancel: CancellationToken,
) {
    // First tick one full period after start, not immediately.
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if ticks.send(AutoplayTick { generation }).await.is_err() {
                    break;
                }
            }
        }
    }
}
