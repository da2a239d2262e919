use std::collections::{HashSet, VecDeque};
use std::path::Path;

use anyhow::{Context, Result, bail};
use image::imageops::FilterType;
use tokio::select;
use tokio::sync::{mpsc::Sender, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::deck::{Deck, ImageSource};
use crate::events::{CarouselSnapshot, ImageOutcome, PreparedImageCpu, SlideImage};

/// Decodes a local image and crops it to cover `width`×`height`, centred.
pub fn prepare_image(source: &ImageSource, width: u32, height: u32) -> Result<PreparedImageCpu> {
    let path = match source {
        ImageSource::File(path) => path,
        ImageSource::Remote(url) => bail!("remote image {url} is not fetched"),
        ImageSource::Invalid(reference) => bail!("unusable image reference {reference:?}"),
    };
    let img = decode(path)?;
    let covered = img.resize_to_fill(width.max(1), height.max(1), FilterType::Triangle);
    let rgba = covered.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(PreparedImageCpu {
        path: path.clone(),
        width,
        height,
        pixels: rgba.into_raw(),
    })
}

fn decode(path: &Path) -> Result<image::DynamicImage> {
    image::ImageReader::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("failed to sniff {}", path.display()))?
        .decode()
        .with_context(|| format!("failed to decode {}", path.display()))
}

/// Loads the images of the current deck for the viewer.
///
/// - Watches snapshots for deck replacements. Within one deck revision each
///   distinct image reference is requested once; references that left the
///   deck are forgotten and failed ones become eligible again.
/// - Watches `target_size` (physical pixels) and reloads the whole deck when
///   it changes, dropping decodes still running at the old size.
/// - At most `max_in_flight` decodes run at a time on the blocking pool.
/// - Failures are reported as `ImageOutcome::Failed`.
pub async fn run(
    mut snapshots: watch::Receiver<CarouselSnapshot>,
    to_viewer: Sender<SlideImage>,
    cancel: CancellationToken,
    max_in_flight: usize,
    mut target_size: watch::Receiver<(u32, u32)>,
) -> Result<()> {
    let max_in_flight = max_in_flight.max(1);
    let mut queue = LoadQueue::default();
    let mut tasks: JoinSet<SlideImage> = JoinSet::new();
    let mut deck_revision = None;
    let mut size = *target_size.borrow_and_update();
    let mut snapshots_open = true;
    let mut sizes_open = true;

    loop {
        {
            let snapshot = snapshots.borrow_and_update();
            if deck_revision != Some(snapshot.deck_revision) {
                deck_revision = Some(snapshot.deck_revision);
                let queued = queue.replace_deck(&snapshot.deck);
                if queued > 0 {
                    info!(queued, slides = snapshot.deck.len(), "queued slide images");
                }
            }
        }

        while tasks.len() < max_in_flight {
            let Some((reference, source)) = queue.pending.pop_front() else {
                break;
            };
            let (width, height) = size;
            tasks.spawn(async move {
                let joined =
                    tokio::task::spawn_blocking(move || prepare_image(&source, width, height))
                        .await;
                let outcome = match joined {
                    Ok(Ok(prepared)) => ImageOutcome::Loaded(prepared),
                    Ok(Err(err)) => ImageOutcome::Failed(format!("{err:#}")),
                    Err(err) => ImageOutcome::Failed(format!("decode task failed: {err}")),
                };
                SlideImage {
                    reference,
                    outcome,
                }
            });
        }

        if !snapshots_open && tasks.is_empty() && queue.pending.is_empty() {
            break;
        }

        select! {
            _ = cancel.cancelled() => break,

            changed = snapshots.changed(), if snapshots_open => {
                if changed.is_err() {
                    debug!("snapshot channel closed");
                    snapshots_open = false;
                }
            }

            changed = target_size.changed(), if sizes_open => {
                if changed.is_err() {
                    debug!("target size channel closed");
                    sizes_open = false;
                    continue;
                }
                let next = *target_size.borrow_and_update();
                if next == size {
                    continue;
                }
                size = next;
                tasks.abort_all();
                let queued = queue.reset(&snapshots.borrow().deck);
                info!(width = size.0, height = size.1, queued, "decode size changed; reloading slide images");
            }

            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                let image = match joined {
                    Ok(image) => image,
                    Err(err) if err.is_cancelled() => continue,
                    Err(err) => {
                        warn!(error = %err, "image task panicked");
                        continue;
                    }
                };
                match &image.outcome {
                    ImageOutcome::Loaded(prepared) => debug!(
                        reference = %image.reference,
                        width = prepared.width,
                        height = prepared.height,
                        "slide image loaded"
                    ),
                    ImageOutcome::Failed(reason) => {
                        warn!(
                            reference = %image.reference,
                            reason = %reason,
                            "slide image unavailable; using fallback tile"
                        );
                        queue.failed.insert(image.reference.clone());
                    }
                }
                if to_viewer.send(image).await.is_err() {
                    debug!("viewer image channel closed");
                    break;
                }
            }
        }
    }

    tasks.abort_all();
    Ok(())
}

/// Which references have been requested, which failed, and what is waiting.
#[derive(Debug, Default)]
struct LoadQueue {
    requested: HashSet<String>,
    failed: HashSet<String>,
    pending: VecDeque<(String, ImageSource)>,
}

impl LoadQueue {
    /// Switches to `deck`, keeping successful requests that are still in it.
    fn replace_deck(&mut self, deck: &Deck) -> usize {
        let current: HashSet<&str> = deck.iter().map(|slide| slide.image.as_str()).collect();
        let failed = std::mem::take(&mut self.failed);
        self.requested
            .retain(|reference| current.contains(reference.as_str()) && !failed.contains(reference));
        self.pending
            .retain(|(reference, _)| current.contains(reference.as_str()));
        self.enqueue(deck)
    }

    /// Forgets everything and queues every reference of `deck` again.
    fn reset(&mut self, deck: &Deck) -> usize {
        self.requested.clear();
        self.failed.clear();
        self.pending.clear();
        self.enqueue(deck)
    }

    fn enqueue(&mut self, deck: &Deck) -> usize {
        let mut queued = 0;
        for slide in deck.iter() {
            if self.requested.insert(slide.image.clone()) {
                self.pending
                    .push_back((slide.image.clone(), deck.image_source(slide)));
                queued += 1;
            }
        }
        queued
    }
}
