//! Conversion from command-line arguments to library configuration

use crate::cli::main_impl::{Cli, CliBackground, CliExecutionProvider, CliOutputFormat};
use crate::{
    config::{BackgroundChoice, ExecutionProvider, OutputFormat, PipelineConfig},
    models::{ModelFamily, ModelSpec},
    segmentation::BackendType,
};
use anyhow::{Context, Result};
use std::path::Path;

pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Pipeline configuration: the `--config` file (if any) with flags applied on top
    pub(crate) fn pipeline_config(cli: &Cli) -> Result<PipelineConfig> {
        let mut config = match &cli.config {
            Some(path) => Self::load_config_file(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(limit) = cli.max_items {
            config.max_batch_size = (limit > 0).then_some(limit);
        }
        if let Some(format) = cli.format {
            config.output_format = match format {
                CliOutputFormat::Png => OutputFormat::Png,
                CliOutputFormat::Jpeg => OutputFormat::Jpeg,
            };
        }
        if let Some(quality) = cli.jpeg_quality {
            config.jpeg_quality = quality;
        }
        if let Some(suffix) = &cli.suffix {
            config.output_suffix.clone_from(suffix);
        }
        if let Some(banner) = &cli.banner {
            config.banner_path.clone_from(banner);
        }
        if let Some(dir) = &cli.work_dir {
            config.work_dir = Some(dir.clone());
        }
        if cli.keep_cutout {
            config.keep_cutout = true;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    fn load_config_file(path: &Path) -> Result<PipelineConfig> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Background selection from `--background` and its companion flags
    pub(crate) fn background_choice(cli: &Cli) -> Result<BackgroundChoice> {
        Ok(match cli.background {
            CliBackground::Transparent => BackgroundChoice::Transparent,
            CliBackground::Color => BackgroundChoice::Color(
                cli.color.clone().unwrap_or_else(|| "#FFFFFF".to_string()),
            ),
            CliBackground::Image => BackgroundChoice::Image(
                cli.background_image
                    .clone()
                    .context("--background image requires --background-image PATH")?,
            ),
            CliBackground::Banner => BackgroundChoice::Banner,
        })
    }

    /// Segmentation model and backend selection
    pub(crate) fn segmenter_setup(cli: &Cli) -> Result<(BackendType, ModelSpec, ExecutionProvider)> {
        let path = cli
            .model
            .clone()
            .context("A segmentation model is required: pass --model PATH")?;
        if !path.is_file() {
            anyhow::bail!("Model file not found: {}", path.display());
        }

        let family: ModelFamily = cli.model_family.parse().context("Invalid --model-family")?;
        let backend: BackendType = cli.backend.parse().context("Invalid --backend")?;
        let provider = match cli.execution_provider {
            CliExecutionProvider::Auto => ExecutionProvider::Auto,
            CliExecutionProvider::Cpu => ExecutionProvider::Cpu,
            CliExecutionProvider::Cuda => ExecutionProvider::Cuda,
            CliExecutionProvider::Coreml => ExecutionProvider::CoreMl,
        };

        let mut model = ModelSpec::new(path, family);
        if let Some(size) = cli.input_size {
            model = model.with_input_size(size);
        }
        Ok((backend, model, provider))
    }
}
