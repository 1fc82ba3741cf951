//! Batch pipeline
//!
//! Runs segmentation and compositing over an ordered list of inputs, one item at
//! a time. Per-item failures are recorded on that item's result and never abort
//! the run; only structural problems (too many items, an unusable workspace)
//! fail the call itself.

use crate::{
    cleanup::RunWorkspace,
    compositor::Compositor,
    config::PipelineConfig,
    error::{BgStudioError, Result},
    segmentation::Segmenter,
    services::{
        ChannelProgressReporter, ImageIOService, OutputFormatHandler, PipelineEvent,
        ProgressReporter, ProgressTracker,
    },
    types::{
        BackgroundSpec, BatchRun, ImageAsset, ImageSource, ItemStatus, OutputArtifact,
        ProcessingResult,
    },
};
use chrono::Utc;
use image::{DynamicImage, GenericImageView, RgbaImage};
use instant::Instant;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::{
    sync::mpsc::{self, UnboundedReceiver},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, span, warn, Level};

/// Sequential batch processor owning a segmenter and its configuration
pub struct BatchPipeline {
    config: PipelineConfig,
    segmenter: Box<dyn Segmenter>,
}

impl std::fmt::Debug for BatchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchPipeline")
            .field("config", &self.config)
            .field("segmenter", &self.segmenter.name())
            .finish()
    }
}

struct ItemOutputs {
    output: OutputArtifact,
    cutout: Option<OutputArtifact>,
}

impl BatchPipeline {
    /// Create a pipeline
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn new(config: PipelineConfig, segmenter: Box<dyn Segmenter>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, segmenter })
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process every item against `background`
    ///
    /// # Errors
    /// - More items than `max_batch_size`
    /// - The run workspace cannot be created
    pub fn run(
        &mut self,
        items: &[ImageSource],
        background: &BackgroundSpec,
        reporter: &dyn ProgressReporter,
    ) -> Result<BatchRun> {
        self.run_with_cancellation(items, background, reporter, &CancellationToken::new())
    }

    /// Like [`BatchPipeline::run`], checking `cancel` between items
    ///
    /// Items not attempted before cancellation are recorded as failed with kind
    /// `Cancelled`, so the run still holds exactly one result per input.
    ///
    /// # Errors
    /// - More items than `max_batch_size`
    /// - The run workspace cannot be created
    #[instrument(skip_all, fields(items = items.len(), segmenter = self.segmenter.name()))]
    pub fn run_with_cancellation(
        &mut self,
        items: &[ImageSource],
        background: &BackgroundSpec,
        reporter: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<BatchRun> {
        if let Some(limit) = self.config.max_batch_size {
            if items.len() > limit {
                return Err(BgStudioError::TooManyItems {
                    count: items.len(),
                    limit,
                });
            }
        }

        let started_at = Utc::now();
        let workspace =
            RunWorkspace::new(self.config.artifact_storage, self.config.work_dir.as_deref())?;
        let run_id = workspace.run_id();
        info!(%run_id, total = items.len(), "Batch run started");

        let compositor = Compositor::new(background);
        OutputFormatHandler::validate_for_background(
            self.config.output_format,
            compositor.applies_background(),
        );

        let mut tracker = ProgressTracker::new(reporter, items.len());
        let mut results = Vec::with_capacity(items.len());
        let mut cancelled = false;

        for (index, source) in items.iter().enumerate() {
            let source_name = source.display_name();

            if cancel.is_cancelled() {
                if !cancelled {
                    warn!(%run_id, remaining = items.len() - index, "Batch run cancelled");
                }
                cancelled = true;
                let error = BgStudioError::Cancelled;
                tracker.item_cancelled(index, &source_name, &error.to_string());
                results.push(ProcessingResult {
                    index,
                    source_name,
                    status: ItemStatus::failed(&error),
                    output: None,
                    cutout: None,
                    elapsed_ms: 0,
                });
                continue;
            }

            let item_start = Instant::now();
            let outcome = {
                let _span = span!(Level::INFO, "item", index, name = %source_name).entered();
                self.process_item(index, source, &compositor, &workspace)
            };
            let elapsed_ms = item_start.elapsed().as_millis() as u64;

            let result = match outcome {
                Ok(outputs) => {
                    debug!(index, elapsed_ms, output = %outputs.output.file_name, "Item processed");
                    tracker.item_succeeded(&source_name);
                    ProcessingResult {
                        index,
                        source_name,
                        status: ItemStatus::Success,
                        output: Some(outputs.output),
                        cutout: outputs.cutout,
                        elapsed_ms,
                    }
                },
                Err(error) => {
                    warn!(index, kind = %error.kind(), error = %error, "Item failed");
                    let status = ItemStatus::failed(&error);
                    tracker.item_failed(index, &source_name, &error.to_string());
                    ProcessingResult {
                        index,
                        source_name,
                        status,
                        output: None,
                        cutout: None,
                        elapsed_ms,
                    }
                },
            };
            results.push(result);
        }

        tracker.finish(run_id, items.len(), cancelled);
        let run = BatchRun {
            results,
            started_at,
            finished_at: Utc::now(),
            cancelled,
            workspace,
        };
        info!(
            %run_id,
            succeeded = run.succeeded(),
            failed = run.failed(),
            cancelled,
            "Batch run finished"
        );
        Ok(run)
    }

    /// Decode, segment, composite, encode and store one item
    fn process_item(
        &mut self,
        index: usize,
        source: &ImageSource,
        compositor: &Compositor,
        workspace: &RunWorkspace,
    ) -> Result<ItemOutputs> {
        if let Some(limit) = self.config.max_item_bytes {
            // Unknown sizes (metadata errors) fall through to decoding
            if let Some(len) = source.encoded_len().ok().flatten() {
                if len > limit {
                    return Err(BgStudioError::InputRejected(format!(
                        "{} is {} bytes, limit is {} bytes",
                        source.display_name(),
                        len,
                        limit
                    )));
                }
            }
        }

        let asset = ImageIOService::load_source(source)?;
        let cutout = self.segment(asset.image())?;
        let foreground = ImageAsset::new(DynamicImage::ImageRgba8(cutout), asset.origin().clone());
        let composited = compositor.composite(&foreground)?;

        let stem = source.stem();
        let bytes = ImageIOService::encode(
            composited.image(),
            self.config.output_format,
            self.config.jpeg_quality,
        )?;
        let file_name = self.config.output_name(&stem);
        let output = OutputArtifact {
            dimensions: composited.dimensions(),
            handle: workspace.store(index, &file_name, bytes)?,
            file_name,
        };

        let cutout = if self.config.keep_cutout && compositor.applies_background() {
            let stored = ImageIOService::encode(foreground.image(), crate::config::OutputFormat::Png, 100)
                .and_then(|bytes| {
                    let name = OutputFormatHandler::cutout_name(&stem);
                    workspace
                        .store(index, &name, bytes)
                        .map(|handle| OutputArtifact {
                            file_name: name,
                            dimensions: foreground.dimensions(),
                            handle,
                        })
                });
            match stored {
                Ok(artifact) => Some(artifact),
                Err(e) => {
                    workspace.release(&output.handle);
                    return Err(e);
                },
            }
        } else {
            None
        };

        Ok(ItemOutputs { output, cutout })
    }

    /// Run the segmenter, turning errors, panics and resized outputs into item failures
    fn segment(&mut self, image: &DynamicImage) -> Result<RgbaImage> {
        let expected = image.dimensions();
        let segmenter = &mut self.segmenter;
        let outcome = catch_unwind(AssertUnwindSafe(|| segmenter.remove_background(image)));

        let cutout = match outcome {
            Ok(Ok(cutout)) => cutout,
            Ok(Err(e)) => {
                return Err(match e {
                    BgStudioError::Segmentation(_) => e,
                    other => BgStudioError::segmentation(other.to_string()),
                })
            },
            Err(payload) => {
                return Err(BgStudioError::segmentation(format!(
                    "segmenter panicked: {}",
                    panic_message(payload.as_ref())
                )))
            },
        };

        if cutout.dimensions() != expected {
            return Err(BgStudioError::segmentation(format!(
                "segmenter returned {:?} for a {:?} image",
                cutout.dimensions(),
                expected
            )));
        }
        Ok(cutout)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A batch running on a blocking worker thread
///
/// Progress events arrive on `events` in the caller's async context; the worker
/// never touches caller state directly.
#[derive(Debug)]
pub struct BatchHandle {
    pub events: UnboundedReceiver<PipelineEvent>,
    pub join: JoinHandle<Result<BatchRun>>,
    cancel: CancellationToken,
}

impl BatchHandle {
    /// Request cooperative cancellation; the current item still completes
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Next event, or `None` once the worker is done
    pub async fn next_event(&mut self) -> Option<PipelineEvent> {
        self.events.recv().await
    }

    /// Wait for the worker and return its run
    ///
    /// # Errors
    /// - Structural run errors, or the worker itself failed
    pub async fn finish(self) -> Result<BatchRun> {
        self.join.await.map_err(|e| {
            BgStudioError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("batch worker failed: {e}"),
            ))
        })?
    }
}

/// Run `pipeline` on the blocking thread pool, marshaling progress through a channel
///
/// Must be called from within a tokio runtime.
pub fn spawn_batch(
    mut pipeline: BatchPipeline,
    items: Vec<ImageSource>,
    background: BackgroundSpec,
    cancel: CancellationToken,
) -> BatchHandle {
    let (sender, events) = mpsc::unbounded_channel();
    let worker_cancel = cancel.clone();
    let join = tokio::task::spawn_blocking(move || {
        let reporter = ChannelProgressReporter::new(sender);
        pipeline.run_with_cancellation(&items, &background, &reporter, &worker_cancel)
    });
    BatchHandle {
        events,
        join,
        cancel,
    }
}
