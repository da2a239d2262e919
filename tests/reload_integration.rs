use std::time::Duration;

use rust_carousel::config::Configuration;
use rust_carousel::events::CarouselCommand;
use rust_carousel::tasks::reload::{self, ReloadState};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const INITIAL: &str = r#"
carousel:
  auto-play-interval-ms: 4000
slides:
  - { id: 1, image: a.jpg, title: A }
  - { id: 2, image: b.jpg, title: B }
"#;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn edited_config_is_forwarded_to_the_controller() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("carousel.yaml");
    std::fs::write(&config_path, INITIAL).unwrap();

    let cfg = Configuration::from_yaml_file(&config_path)
        .unwrap()
        .validated()
        .unwrap();
    let deck = cfg.load_deck().unwrap();
    let state = ReloadState::from_config(&cfg, deck);

    let (tx, mut rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(reload::run(
        config_path.clone(),
        state,
        None,
        tx,
        cancel.clone(),
    ));
    // Give the watcher time to register before editing.
    tokio::time::sleep(Duration::from_millis(300)).await;

    // An invalid edit is ignored.
    std::fs::write(&config_path, "carousel:\n  auto-play-interval-ms: 0\n").unwrap();
    let ignored = tokio::time::timeout(Duration::from_millis(800), rx.recv()).await;
    assert!(ignored.is_err(), "invalid configuration must not produce commands");

    let edited = INITIAL
        .replace("4000", "1500")
        .replace("title: B", "title: Bee");
    std::fs::write(&config_path, edited).unwrap();

    let mut received = Vec::new();
    while received.len() < 2 {
        let command = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timeout waiting for reload command")
            .expect("reload channel closed");
        received.push(command);
    }
    assert!(matches!(&received[0], CarouselCommand::ReplaceDeck(deck) if deck[1].title == "Bee"));
    assert_eq!(received[1], CarouselCommand::SetInterval(1500));

    cancel.cancel();
    handle.await.unwrap().unwrap();
}
