use std::time::Duration;

use rust_carousel::carousel::GoToPolicy;
use rust_carousel::config::CarouselOptions;
use rust_carousel::deck::{Deck, Slide, SlideId};
use rust_carousel::events::{CarouselCommand, CarouselSnapshot, ChangeCause};
use rust_carousel::tasks::controller;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

fn deck(titles: &[&str]) -> Deck {
    let slides = titles
        .iter()
        .enumerate()
        .map(|(i, title)| Slide {
            id: SlideId::Number(i as i64 + 1),
            image: format!("{}.jpg", title.to_lowercase()),
            title: title.to_string(),
            description: String::new(),
        })
        .collect();
    Deck::new(slides, "/slides").unwrap()
}

fn options(interval_ms: u64, auto_play: bool) -> CarouselOptions {
    CarouselOptions {
        auto_play,
        auto_play_interval_ms: interval_ms,
        ..CarouselOptions::default()
    }
}

struct Harness {
    commands: mpsc::Sender<CarouselCommand>,
    snapshots: watch::Receiver<CarouselSnapshot>,
    cancel: CancellationToken,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl Harness {
    fn start(deck: Deck, options: CarouselOptions) -> Self {
        let (commands, command_rx) = mpsc::channel(16);
        let (snapshot_tx, snapshots) = watch::channel(controller::initial_snapshot(&deck, &options));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(controller::run(
            command_rx,
            snapshot_tx,
            cancel.clone(),
            deck,
            options,
        ));
        Self {
            commands,
            snapshots,
            cancel,
            handle,
        }
    }

    fn index(&self) -> Option<usize> {
        self.snapshots.borrow().current_index
    }

    fn snapshot(&self) -> CarouselSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Sends a command and lets the controller process it.
    async fn send(&self, command: CarouselCommand) {
        self.commands.send(command).await.unwrap();
        settle().await;
    }
}

/// With paused time the clock only moves once every task is idle, so a short
/// sleep guarantees queued commands have been applied.
async fn settle() {
    sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn advances_exactly_once_per_interval() {
    let h = Harness::start(deck(&["A", "B", "C"]), options(1000, true));
    settle().await;
    assert!(h.snapshot().autoplay_active);

    sleep(Duration::from_millis(997)).await; // t = 998
    assert_eq!(h.index(), Some(0));
    sleep(Duration::from_millis(4)).await; // t = 1002
    assert_eq!(h.index(), Some(1));
    sleep(Duration::from_millis(995)).await; // t = 1997
    assert_eq!(h.index(), Some(1));
    sleep(Duration::from_millis(5)).await; // t = 2002
    assert_eq!(h.index(), Some(2));
    sleep(Duration::from_millis(1000)).await; // t = 3002
    assert_eq!(h.index(), Some(0), "autoplay wraps to the first slide");
    let last = h.snapshot().last_change.unwrap();
    assert!(last.change.wrapped);
    assert_eq!(last.cause, ChangeCause::Autoplay);
}

#[tokio::test(start_paused = true)]
async fn pausing_halts_advancement() {
    let h = Harness::start(deck(&["A", "B", "C"]), options(1000, true));
    sleep(Duration::from_millis(1500)).await;
    assert_eq!(h.index(), Some(1));

    h.send(CarouselCommand::TogglePlayback).await;
    let snap = h.snapshot();
    assert!(!snap.is_playing);
    assert!(!snap.autoplay_active);

    sleep(Duration::from_secs(10)).await;
    assert_eq!(h.index(), Some(1));

    // Resuming starts a fresh interval from the moment of the toggle.
    h.send(CarouselCommand::TogglePlayback).await;
    sleep(Duration::from_millis(990)).await;
    assert_eq!(h.index(), Some(1));
    sleep(Duration::from_millis(20)).await;
    assert_eq!(h.index(), Some(2));
}

#[tokio::test(start_paused = true)]
async fn navigation_scenarios_on_three_slides() {
    let h = Harness::start(deck(&["A", "B", "C"]), options(4000, false));
    settle().await;
    assert_eq!(h.index(), Some(0));

    for expected in [1, 2, 0] {
        h.send(CarouselCommand::Next).await;
        assert_eq!(h.index(), Some(expected));
    }

    h.send(CarouselCommand::Previous).await;
    assert_eq!(h.index(), Some(2));
    assert!(h.snapshot().last_change.unwrap().change.wrapped);

    h.send(CarouselCommand::GoTo(1)).await;
    assert_eq!(h.index(), Some(1));

    let revision = h.snapshot().revision;
    h.send(CarouselCommand::GoTo(7)).await;
    assert_eq!(h.index(), Some(1), "out-of-range go-to is rejected");
    assert_eq!(h.snapshot().revision, revision);

    assert_eq!(h.snapshot().current_slide().unwrap().title, "B");
}

#[tokio::test(start_paused = true)]
async fn clamping_policy_moves_to_last_slide() {
    let opts = CarouselOptions {
        go_to_policy: GoToPolicy::Clamp,
        ..options(4000, false)
    };
    let h = Harness::start(deck(&["A", "B", "C"]), opts);
    h.send(CarouselCommand::GoTo(9)).await;
    assert_eq!(h.index(), Some(2));
}

#[tokio::test(start_paused = true)]
async fn manual_navigation_keeps_the_running_timer() {
    let h = Harness::start(deck(&["A", "B", "C", "D"]), options(1000, true));
    sleep(Duration::from_millis(500)).await;
    h.send(CarouselCommand::Next).await;
    assert_eq!(h.index(), Some(1));
    sleep(Duration::from_millis(505)).await; // t ≈ 1006
    assert_eq!(h.index(), Some(2));
}

#[tokio::test(start_paused = true)]
async fn empty_deck_never_schedules_a_timer() {
    let h = Harness::start(Deck::empty(), options(100, true));
    settle().await;
    let snap = h.snapshot();
    assert_eq!(snap.current_index, None);
    assert!(!snap.autoplay_active);
    let revision = snap.revision;

    h.send(CarouselCommand::Next).await;
    h.send(CarouselCommand::GoTo(0)).await;
    sleep(Duration::from_secs(5)).await;
    assert_eq!(h.snapshot().revision, revision);
    assert_eq!(h.index(), None);
}

#[tokio::test(start_paused = true)]
async fn single_slide_never_advances() {
    let h = Harness::start(deck(&["Only"]), options(100, true));
    sleep(Duration::from_secs(5)).await;
    let snap = h.snapshot();
    assert_eq!(snap.current_index, Some(0));
    assert!(snap.is_playing);
    assert!(!snap.autoplay_active);
    assert!(snap.last_change.is_none());
}

#[tokio::test(start_paused = true)]
async fn interval_change_retimes_the_next_tick() {
    let h = Harness::start(deck(&["A", "B", "C"]), options(1000, true));
    sleep(Duration::from_millis(500)).await;
    h.send(CarouselCommand::SetInterval(3000)).await;
    assert_eq!(h.snapshot().interval, Duration::from_millis(3000));

    sleep(Duration::from_millis(1000)).await; // t ≈ 1501
    assert_eq!(h.index(), Some(0));
    sleep(Duration::from_millis(1990)).await; // t ≈ 3491
    assert_eq!(h.index(), Some(0));
    sleep(Duration::from_millis(20)).await; // t ≈ 3511
    assert_eq!(h.index(), Some(1));
}

#[tokio::test(start_paused = true)]
async fn deck_replacement_stops_and_restarts_autoplay() {
    let h = Harness::start(deck(&["A", "B", "C"]), options(1000, true));
    sleep(Duration::from_millis(1500)).await;
    assert_eq!(h.index(), Some(1));

    h.send(CarouselCommand::ReplaceDeck(deck(&["Solo"]))).await;
    let snap = h.snapshot();
    assert_eq!(snap.current_index, Some(0));
    assert!(!snap.autoplay_active);
    sleep(Duration::from_secs(3)).await;
    assert_eq!(h.index(), Some(0));

    h.send(CarouselCommand::ReplaceDeck(deck(&["X", "Y"]))).await;
    assert!(h.snapshot().autoplay_active);
    assert_eq!(h.snapshot().deck_revision, 2);
    sleep(Duration::from_millis(1010)).await;
    assert_eq!(h.index(), Some(1));
}

#[tokio::test(start_paused = true)]
async fn teardown_stops_all_updates() {
    let Harness {
        commands,
        snapshots,
        cancel,
        handle,
    } = Harness::start(deck(&["A", "B", "C"]), options(1000, true));
    sleep(Duration::from_millis(1500)).await;
    cancel.cancel();
    handle.await.unwrap().unwrap();

    let revision = snapshots.borrow().revision;
    sleep(Duration::from_secs(10)).await;
    assert_eq!(snapshots.borrow().revision, revision);
    assert_eq!(snapshots.borrow().current_index, Some(1));
    assert!(commands.send(CarouselCommand::Next).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn closing_the_command_channel_ends_the_controller() {
    let Harness {
        commands, handle, ..
    } = Harness::start(deck(&["A", "B"]), options(1000, true));
    drop(commands);
    handle.await.unwrap().unwrap();
}
