use std::path::Path;
use std::time::Duration;

use image::{ImageBuffer, Rgba};
use rust_carousel::config::CarouselOptions;
use rust_carousel::deck::{Deck, ImageSource, Slide, SlideId};
use rust_carousel::events::{ImageOutcome, SlideImage};
use rust_carousel::tasks::{controller, loader};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

fn write_png(path: &Path, width: u32, height: u32) {
    let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
        ImageBuffer::from_fn(width, height, |x, _| Rgba([(x % 256) as u8, 64, 128, 255]));
    img.save(path).unwrap();
}

fn slide(id: i64, image: &str) -> Slide {
    Slide {
        id: SlideId::Number(id),
        image: image.to_string(),
        title: format!("Slide {id}"),
        description: String::new(),
    }
}

async fn collect(rx: &mut mpsc::Receiver<SlideImage>, count: usize) -> Vec<SlideImage> {
    let mut images = Vec::new();
    while images.len() < count {
        let image = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timeout waiting for slide image")
            .expect("loader channel closed");
        images.push(image);
    }
    images
}

#[test]
fn prepare_image_covers_the_target() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wide.png");
    write_png(&path, 400, 100);

    let prepared = loader::prepare_image(&ImageSource::File(path.clone()), 80, 40).unwrap();
    assert_eq!((prepared.width, prepared.height), (80, 40));
    assert_eq!(prepared.pixels.len(), 80 * 40 * 4);
    assert_eq!(prepared.path, path);
}

#[test]
fn prepare_image_rejects_unusable_sources() {
    let missing = ImageSource::File("/definitely/not/here.png".into());
    assert!(loader::prepare_image(&missing, 10, 10).is_err());

    let remote = ImageSource::Remote("https://example.com/a.png".parse().unwrap());
    let err = loader::prepare_image(&remote, 10, 10).unwrap_err();
    assert!(err.to_string().contains("not fetched"));

    let dir = tempfile::tempdir().unwrap();
    let garbage = dir.path().join("garbage.png");
    std::fs::write(&garbage, b"not an image").unwrap();
    assert!(loader::prepare_image(&ImageSource::File(garbage), 10, 10).is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shared_references_load_once_and_failures_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    write_png(&dir.path().join("a.png"), 64, 32);
    write_png(&dir.path().join("b.png"), 32, 64);

    let deck = Deck::new(
        vec![
            slide(1, "a.png"),
            slide(2, "b.png"),
            slide(3, "a.png"),
            slide(4, "missing.png"),
            slide(5, "https://example.com/remote.png"),
        ],
        dir.path(),
    )
    .unwrap();

    let snapshot = controller::initial_snapshot(&deck, &CarouselOptions::default());
    let (_snapshot_tx, snapshot_rx) = watch::channel(snapshot);
    let (image_tx, mut image_rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let (_size_tx, size_rx) = watch::channel((40, 20));
    let handle = tokio::spawn(loader::run(snapshot_rx, image_tx, cancel.clone(), 2, size_rx));

    let mut images = collect(&mut image_rx, 4).await;
    images.sort_by(|a, b| a.reference.cmp(&b.reference));
    let references: Vec<&str> = images.iter().map(|i| i.reference.as_str()).collect();
    assert_eq!(
        references,
        vec!["a.png", "b.png", "https://example.com/remote.png", "missing.png"]
    );
    for image in &images {
        match (image.reference.as_str(), &image.outcome) {
            ("a.png" | "b.png", ImageOutcome::Loaded(prepared)) => {
                assert_eq!((prepared.width, prepared.height), (40, 20));
            }
            ("missing.png" | "https://example.com/remote.png", ImageOutcome::Failed(_)) => {}
            (reference, outcome) => panic!("unexpected outcome for {reference}: {outcome:?}"),
        }
    }

    // Nothing else arrives: the duplicate reference was decoded once.
    let extra = tokio::time::timeout(Duration::from_millis(300), image_rx.recv()).await;
    assert!(extra.is_err(), "shared reference must not be decoded twice");

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn replaced_deck_only_loads_new_references() {
    let dir = tempfile::tempdir().unwrap();
    write_png(&dir.path().join("a.png"), 16, 16);
    write_png(&dir.path().join("c.png"), 16, 16);

    let first = Deck::new(vec![slide(1, "a.png")], dir.path()).unwrap();
    let options = CarouselOptions::default();
    let (snapshot_tx, snapshot_rx) = watch::channel(controller::initial_snapshot(&first, &options));
    let (image_tx, mut image_rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let (_size_tx, size_rx) = watch::channel((8, 8));
    let handle = tokio::spawn(loader::run(snapshot_rx, image_tx, cancel.clone(), 4, size_rx));

    let images = collect(&mut image_rx, 1).await;
    assert_eq!(images[0].reference, "a.png");

    let second = Deck::new(vec![slide(1, "a.png"), slide(2, "c.png")], dir.path()).unwrap();
    let mut snapshot = controller::initial_snapshot(&second, &options);
    snapshot.deck_revision = 1;
    snapshot.revision = 2;
    snapshot_tx.send_replace(snapshot);

    let images = collect(&mut image_rx, 1).await;
    assert_eq!(images[0].reference, "c.png");
    assert!(matches!(images[0].outcome, ImageOutcome::Loaded(_)));

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_reference_is_retried_after_deck_reload() {
    let dir = tempfile::tempdir().unwrap();
    let deck = Deck::new(vec![slide(1, "late.png")], dir.path()).unwrap();
    let options = CarouselOptions::default();
    let (snapshot_tx, snapshot_rx) = watch::channel(controller::initial_snapshot(&deck, &options));
    let (image_tx, mut image_rx) = mpsc::channel(8);
    let (_size_tx, size_rx) = watch::channel((8, 8));
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(loader::run(snapshot_rx, image_tx, cancel.clone(), 2, size_rx));

    let images = collect(&mut image_rx, 1).await;
    assert!(matches!(images[0].outcome, ImageOutcome::Failed(_)));

    write_png(&dir.path().join("late.png"), 16, 16);
    let mut snapshot = controller::initial_snapshot(&deck, &options);
    snapshot.deck_revision = 1;
    snapshot.revision = 1;
    snapshot_tx.send_replace(snapshot);

    let images = collect(&mut image_rx, 1).await;
    assert_eq!(images[0].reference, "late.png");
    assert!(matches!(images[0].outcome, ImageOutcome::Loaded(_)));

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn images_reload_at_the_new_decode_size() {
    let dir = tempfile::tempdir().unwrap();
    write_png(&dir.path().join("a.png"), 64, 32);
    let deck = Deck::new(vec![slide(1, "a.png")], dir.path()).unwrap();
    let (_snapshot_tx, snapshot_rx) =
        watch::channel(controller::initial_snapshot(&deck, &CarouselOptions::default()));
    let (image_tx, mut image_rx) = mpsc::channel(8);
    let (size_tx, size_rx) = watch::channel((40, 20));
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(loader::run(snapshot_rx, image_tx, cancel.clone(), 2, size_rx));

    let images = collect(&mut image_rx, 1).await;
    let ImageOutcome::Loaded(prepared) = &images[0].outcome else {
        panic!("expected a decoded image");
    };
    assert_eq!((prepared.width, prepared.height), (40, 20));

    size_tx.send_replace((80, 40));
    let images = collect(&mut image_rx, 1).await;
    let ImageOutcome::Loaded(prepared) = &images[0].outcome else {
        panic!("expected a decoded image");
    };
    assert_eq!((prepared.width, prepared.height), (80, 40));

    cancel.cancel();
    handle.await.unwrap().unwrap();
}
