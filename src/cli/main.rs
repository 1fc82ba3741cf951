//! Batch background removal CLI

use super::{config::CliConfigBuilder, inputs::discover_inputs};
use crate::{
    archive::ArchiveBuilder,
    pipeline::{spawn_batch, BatchPipeline},
    segmentation::{available_backends, create_segmenter},
    services::PipelineEvent,
    tracing_config::init_cli_tracing,
    types::{BackgroundSpec, BatchRun, ImageSource},
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Remove image backgrounds in batches and composite new ones
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgremove-studio")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input images or directories, processed in the given order
    #[arg(value_name = "INPUT", required_unless_present = "show_providers")]
    pub inputs: Vec<PathBuf>,

    /// Background to place behind the subject
    #[arg(short, long, value_enum, default_value_t = CliBackground::Transparent)]
    pub background: CliBackground,

    /// Hex color for `--background color` (#RGB, #RRGGBB or #RRGGBBAA)
    #[arg(long, value_name = "HEX")]
    pub color: Option<String>,

    /// Image file for `--background image`
    #[arg(long, value_name = "PATH")]
    pub background_image: Option<PathBuf>,

    /// Banner image for `--background banner`
    #[arg(long, value_name = "PATH")]
    pub banner: Option<PathBuf>,

    /// ONNX segmentation model file
    #[arg(short, long, value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// Model family: u2net or isnet
    #[arg(long, default_value = "u2net")]
    pub model_family: String,

    /// Override the model's square input size
    #[arg(long, value_name = "PIXELS")]
    pub input_size: Option<u32>,

    /// Inference backend: onnx or tract
    #[arg(long, default_value = "onnx")]
    pub backend: String,

    /// Execution provider for the ONNX backend
    #[arg(short, long, value_enum, default_value_t = CliExecutionProvider::Auto)]
    pub execution_provider: CliExecutionProvider,

    /// Output format
    #[arg(short, long, value_enum)]
    pub format: Option<CliOutputFormat>,

    /// JPEG quality (0-100)
    #[arg(long)]
    pub jpeg_quality: Option<u8>,

    /// Suffix appended to output names
    #[arg(long)]
    pub suffix: Option<String>,

    /// Directory receiving the processed images [default: processed, unless --archive is given]
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Also bundle the processed images into this ZIP file
    #[arg(short, long, value_name = "FILE")]
    pub archive: Option<PathBuf>,

    /// Search directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// File-name glob applied inside directories (e.g. "*.jpg")
    #[arg(long)]
    pub pattern: Option<String>,

    /// Maximum items per batch (0 = unlimited)
    #[arg(long)]
    pub max_items: Option<usize>,

    /// Keep the transparent cut-out next to each composited image
    #[arg(long)]
    pub keep_cutout: bool,

    /// Parent directory for run workspaces
    #[arg(long, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// JSON pipeline configuration; flags override its values
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    pub summary_json: bool,

    /// Show backends and execution providers, then exit
    #[arg(long)]
    pub show_providers: bool,

    /// Verbose logging (-v: debug, -vv: trace, -vvv: trace for all crates)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliBackground {
    Transparent,
    Color,
    Image,
    Banner,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliOutputFormat {
    Png,
    Jpeg,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliExecutionProvider {
    Auto,
    Cpu,
    Cuda,
    Coreml,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _tracing = init_cli_tracing(cli.verbose).context("Failed to initialize tracing")?;

    if cli.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }

    let config = CliConfigBuilder::pipeline_config(&cli)?;
    let background = CliConfigBuilder::background_choice(&cli)?
        .resolve(&config)
        .context("Invalid background")?;

    let files = discover_inputs(&cli.inputs, cli.recursive, cli.pattern.as_deref())?;
    if files.is_empty() {
        warn!("No supported images found in the provided inputs");
        return Ok(());
    }
    info!("Found {} image(s) to process", files.len());

    let (backend, model, provider) = CliConfigBuilder::segmenter_setup(&cli)?;
    info!("Segmenting with {} on {} ({})", model.display_name(), backend, provider);
    let segmenter =
        create_segmenter(backend, model, provider).context("Failed to create segmenter")?;

    let compression = config.archive_compression;
    let pipeline = BatchPipeline::new(config, segmenter).context("Invalid configuration")?;
    let items: Vec<ImageSource> = files.into_iter().map(ImageSource::from).collect();

    let run = run_with_progress(pipeline, items, background).await?;

    let output_dir = match (&cli.output, &cli.archive) {
        (Some(dir), _) => Some(dir.clone()),
        (None, None) => Some(PathBuf::from("processed")),
        (None, Some(_)) => None,
    };
    if let Some(dir) = output_dir {
        let written = run
            .export_outputs(&dir)
            .with_context(|| format!("Failed to export results to {}", dir.display()))?;
        info!("Wrote {} file(s) to {}", written.len(), dir.display());
    }
    if let Some(path) = &cli.archive {
        let size = ArchiveBuilder::new(compression)
            .write_to_path(&run, path)
            .with_context(|| format!("Failed to write archive {}", path.display()))?;
        info!("Wrote archive {} ({} bytes)", path.display(), size);
    }

    if cli.summary_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&run.summary()).context("Failed to serialize summary")?
        );
    }

    eprintln!(
        "{} succeeded, {} failed{}",
        run.succeeded(),
        run.failed(),
        if run.was_cancelled() { " (cancelled)" } else { "" }
    );

    let all_failed = run.total() > 0 && run.succeeded() == 0;
    run.finish();
    if all_failed {
        anyhow::bail!("No image was processed successfully");
    }
    Ok(())
}

/// Run the batch on a worker, rendering its events until it finishes
///
/// Ctrl-C requests cancellation; items already started still complete.
async fn run_with_progress(
    pipeline: BatchPipeline,
    items: Vec<ImageSource>,
    background: BackgroundSpec,
) -> Result<BatchRun> {
    let pb = ProgressBar::new(items.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("Invalid progress template")?
            .progress_chars("#>-"),
    );

    let token = CancellationToken::new();
    let mut handle = spawn_batch(pipeline, items, background, token.clone());
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(PipelineEvent::Progress(update)) => {
                    pb.set_position(update.completed as u64);
                    pb.set_message(update.current_item);
                },
                Some(PipelineEvent::ItemFailed(failure)) => {
                    pb.println(format!("{} ({})", failure, failure.name));
                },
                Some(PipelineEvent::Finished(_)) => {},
                None => break,
            },
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                pb.println("Cancelling after the current image...");
                token.cancel();
            },
        }
    }

    pb.finish_and_clear();
    handle.finish().await.context("Batch run failed")
}

fn show_provider_diagnostics() {
    println!("Backends compiled in:");
    for backend in available_backends() {
        println!("  - {}", backend);
    }

    #[cfg(feature = "onnx")]
    {
        println!("\nONNX Runtime execution providers:");
        for (name, available) in crate::backends::OnnxBackend::list_providers() {
            println!(
                "  - {}: {}",
                name,
                if available { "available" } else { "not available" }
            );
        }
    }
}
