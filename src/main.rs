use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use rust_carousel::config::Configuration;
use rust_carousel::deck::Deck;
use rust_carousel::events::{CarouselCommand, SlideImage};
use rust_carousel::tasks;
use rust_carousel::tasks::reload::ReloadState;
use rust_carousel::tasks::viewer::ViewerChannels;

#[derive(Debug, Parser)]
#[command(name = "carousel", version, about = "image carousel with autoplay")]
struct Args {
    /// Path to YAML config
    #[arg(value_name = "CONFIG")]
    config: PathBuf,
    /// Print the order autoplay would visit slides in without opening a window
    #[arg(long = "dry-run", value_name = "STEPS", value_parser = clap::value_parser!(u32))]
    dry_run: Option<u32>,
    /// Start with autoplay paused regardless of `auto-play`
    #[arg(long = "start-paused")]
    start_paused: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // init tracing (RUST_LOG controls level, default = info)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let Args {
        config,
        dry_run,
        start_paused,
    } = Args::parse();

    let mut cfg = Configuration::from_yaml_file(&config)
        .with_context(|| format!("failed to load configuration from {}", config.display()))?
        .validated()
        .context("invalid configuration values")?;
    if start_paused {
        cfg.carousel.auto_play = false;
    }
    tracing::info!(
        "Loaded configuration from {}:\n{:#?}",
        config.display(),
        cfg.carousel
    );

    let deck = cfg.load_deck().context("failed to load deck")?;
    tracing::info!(slides = deck.len(), "deck loaded");

    if let Some(steps) = dry_run {
        print_dry_run(&cfg, &deck, steps);
        return Ok(());
    }

    // Channels (small/bounded)
    let (command_tx, command_rx) = mpsc::channel::<CarouselCommand>(32); // Viewer/Reload -> Controller
    let (image_tx, image_rx) = mpsc::channel::<SlideImage>(cfg.loader_max_concurrent_decodes); // Loader -> Viewer
    let (snapshot_tx, snapshot_rx) =
        watch::channel(tasks::controller::initial_snapshot(&deck, &cfg.carousel)); // Controller -> Viewer/Loader

    // Viewer -> Loader; logical size until the window reports its scale factor
    let (decode_size_tx, decode_size_rx) =
        watch::channel((cfg.viewport.width, cfg.viewport.height));

    let cancel = CancellationToken::new();

    // Ctrl-D/Ctrl-C cancel the pipeline
    if io::stdin().is_terminal() {
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            let mut sink = Vec::new();
            match io::stdin().read_to_end(&mut sink) {
                Ok(_) => tracing::info!("stdin closed; initiating shutdown"),
                Err(err) => tracing::warn!("stdin watcher failed: {err}"),
            }
            cancel.cancel();
        });
    } else {
        tracing::debug!("stdin is not a terminal; skipping shutdown watcher");
    }

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    let mut tasks = JoinSet::new();

    // Controller
    tasks.spawn({
        let cancel = cancel.clone();
        let deck = deck.clone();
        let options = cfg.carousel.clone();
        async move {
            tasks::controller::run(command_rx, snapshot_tx, cancel, deck, options)
                .await
                .context("controller task failed")
        }
    });

    // Loader
    tasks.spawn({
        let snapshots = snapshot_rx.clone();
        let cancel = cancel.clone();
        let max_in_flight = cfg.loader_max_concurrent_decodes;
        async move {
            tasks::loader::run(snapshots, image_tx, cancel, max_in_flight, decode_size_rx)
                .await
                .context("loader task failed")
        }
    });

    // Reload watcher (optional)
    if cfg.watch_for_changes {
        tasks.spawn({
            let state = ReloadState::from_config(&cfg, deck.clone());
            let deck_file = cfg.deck_file_path();
            let to_controller = command_tx.clone();
            let cancel = cancel.clone();
            let config = config.clone();
            async move {
                tasks::reload::run(config, state, deck_file, to_controller, cancel)
                    .await
                    .context("reload task failed")
            }
        });
    }

    // Run the windowed viewer on the main thread (blocking) after spawning other tasks
    // This call returns when the window closes or cancellation occurs
    let channels = ViewerChannels {
        snapshots: snapshot_rx,
        images: image_rx,
        commands: command_tx,
        decode_size: decode_size_tx,
    };
    if let Err(e) =
        tasks::viewer::run_windowed(&cfg, channels, cancel.clone()).context("viewer failed")
    {
        tracing::error!("{e:?}");
    }
    // Ensure other tasks are asked to stop
    cancel.cancel();

    // Drain JoinSet (wait for other tasks to complete)
    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("task error: {e:?}"),
            Err(e) => tracing::error!("join error: {e}"),
        }
    }

    Ok(())
}

fn print_dry_run(cfg: &Configuration, deck: &Deck, steps: u32) {
    let interval = cfg.carousel.auto_play_interval();
    println!(
        "# autoplay dry run\n# slides: {}\n# interval: {}\n# steps: {}\n# auto-play: {}\n",
        deck.len(),
        humantime::format_duration(interval),
        steps,
        cfg.carousel.auto_play
    );

    if deck.is_empty() {
        println!("(no items to display)");
        return;
    }

    let order = tasks::controller::simulate_autoplay(deck.len(), steps as usize);
    if deck.len() < 2 {
        println!("(autoplay inactive with fewer than two slides)");
    }
    println!("# planned order:");
    for (step, index) in order.iter().enumerate() {
        let slide = &deck[*index];
        let at = humantime::format_duration(step_offset(interval, step));
        let title = if slide.title.is_empty() {
            slide.image.as_str()
        } else {
            slide.title.as_str()
        };
        println!("  {:>4}: +{:<8} [{}] {}", step, at.to_string(), slide.id, title);
    }
}

/// Time at which autoplay reaches `step`, saturating instead of wrapping.
fn step_offset(interval: Duration, step: usize) -> Duration {
    u32::try_from(step).map_or(Duration::MAX, |step| interval.saturating_mul(step))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dry_run_steps_are_bounded() {
        let args = Args::try_parse_from(["carousel", "cfg.yaml", "--dry-run", "12"]).unwrap();
        assert_eq!(args.dry_run, Some(12));

        let too_many = format!("{}", u64::from(u32::MAX) + 1);
        assert!(Args::try_parse_from(["carousel", "cfg.yaml", "--dry-run", &too_many]).is_err());
        assert!(Args::try_parse_from(["carousel", "cfg.yaml", "--dry-run", "-1"]).is_err());
    }

    #[test]
    fn step_offsets_do_not_wrap() {
        let interval = Duration::from_millis(4000);
        assert_eq!(step_offset(interval, 3), Duration::from_secs(12));
        let last = step_offset(interval, u32::MAX as usize);
        assert_eq!(last, interval * u32::MAX);
        assert!(step_offset(interval, u32::MAX as usize + 1) >= last);
    }
}
