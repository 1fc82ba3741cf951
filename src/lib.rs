#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # bgremove-studio
//!
//! Batch background removal and compositing.
//!
//! An ordered list of images runs through a pluggable segmentation step, the
//! cut-out subject is optionally composited over a new background (solid
//! color, custom image or banner) and the results come back individually or
//! as a ZIP archive. Every transient artifact of a run lives in a per-run
//! workspace that is released on every exit path.
//!
//! ## Features
//!
//! - **Pluggable segmentation**: any [`Segmenter`], or a model-backed
//!   [`ModelSegmenter`] over ONNX Runtime or Tract
//! - **Compositing**: Porter-Duff "over" onto transparent, color or image backgrounds
//! - **Per-item isolation**: one failing image never aborts the batch
//! - **Background worker**: [`spawn_batch`] runs off the async executor and
//!   streams [`PipelineEvent`]s back to the caller
//! - **Archives**: successful outputs bundled with unique entry names
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bgremove_studio::{
//!     ArchiveBuilder, BackgroundSpec, BatchPipeline, ConsoleProgressReporter, ImageSource,
//!     ModelFamily, ModelSpec, PipelineConfig, BackendType, ExecutionProvider, create_segmenter,
//! };
//!
//! # fn example() -> anyhow::Result<()> {
//! let model = ModelSpec::new("models/u2net.onnx", ModelFamily::U2Net);
//! let segmenter = create_segmenter(BackendType::Tract, model, ExecutionProvider::Cpu)?;
//! let mut pipeline = BatchPipeline::new(PipelineConfig::default(), segmenter)?;
//!
//! let items = vec![ImageSource::from_path("cat.jpg"), ImageSource::from_path("dog.png")];
//! let background = BackgroundSpec::from_hex("#ffffff")?;
//! let run = pipeline.run(&items, &background, &ConsoleProgressReporter::new(false))?;
//!
//! for failure in run.failures() {
//!     eprintln!("item {} failed: {}", failure.index + 1, failure.failure_reason().unwrap_or(""));
//! }
//! ArchiveBuilder::default().write_to_path(&run, "results.zip")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom segmenters
//!
//! ```rust
//! use bgremove_studio::{FnSegmenter, Segmenter};
//! use image::DynamicImage;
//!
//! // Keeps every pixel: useful for compositing already-cut images
//! let mut passthrough = FnSegmenter::new("passthrough", |image: &DynamicImage| Ok(image.to_rgba8()));
//! let cut = passthrough.remove_background(&DynamicImage::new_rgb8(4, 4)).unwrap();
//! assert_eq!(cut.dimensions(), (4, 4));
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with GPU acceleration support
//! - `tract` (default): Pure Rust backend
//! - `cli` (default): Command-line interface and tracing setup
//! - `webp-support`: WebP input decoding

pub mod archive;
pub mod backends;
pub mod cleanup;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod error;
pub mod inference;
pub mod models;
pub mod pipeline;
pub mod segmentation;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

// Public API exports
pub use archive::{ArchiveBuilder, ArchiveEntry};
pub use backends::*;
pub use cleanup::{ArtifactHandle, RunWorkspace};
pub use compositor::{blend_over, composite, Compositor};
pub use config::{
    ArchiveCompression, ArtifactStorage, BackgroundChoice, ExecutionProvider, OutputFormat,
    PipelineConfig, PipelineConfigBuilder,
};
pub use error::{BgStudioError, ErrorKind, Result};
pub use inference::InferenceBackend;
pub use models::{ModelFamily, ModelSpec, PreprocessingConfig};
pub use pipeline::{spawn_batch, BatchHandle, BatchPipeline};
pub use segmentation::{
    available_backends, create_segmenter, BackendType, FnSegmenter, ModelSegmenter, Segmenter,
};
pub use services::{
    BatchCompletion, BatchProgress, ChannelProgressReporter, ConsoleProgressReporter,
    FnProgressReporter, ImageIOService, ItemFailure, NoOpProgressReporter, OutputFormatHandler,
    PipelineEvent, ProgressReporter, ProgressTracker,
};
pub use types::{
    parse_hex_color, AssetOrigin, BackgroundSpec, BatchRun, BatchSummary, ImageAsset, ImageSource,
    ItemStatus, ItemSummary, OutputArtifact, ProcessingResult, SegmentationMask,
};
pub use utils::{ImagePreprocessor, LetterboxGeometry};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat, TracingOutput};

/// Run a batch on a background worker and wait for it, discarding events
///
/// Convenience for async callers that only need the final [`BatchRun`].
pub async fn run_batch_in_background(
    pipeline: BatchPipeline,
    items: Vec<ImageSource>,
    background: BackgroundSpec,
) -> Result<BatchRun> {
    let mut handle = spawn_batch(
        pipeline,
        items,
        background,
        tokio_util::sync::CancellationToken::new(),
    );
    while handle.next_event().await.is_some() {}
    handle.finish().await
}
