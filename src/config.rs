//! Configuration types for batch background removal and compositing

use crate::{
    error::{BgStudioError, Result},
    types::{parse_hex_color, BackgroundSpec, ImageSource},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default cap on items per batch (upload constraint of the front ends)
pub const DEFAULT_MAX_BATCH_SIZE: usize = 10;

/// Default cap on the encoded size of one input item
pub const DEFAULT_MAX_ITEM_BYTES: u64 = 5 * 1024 * 1024;

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

/// Encoding of composited outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG with alpha channel transparency
    #[default]
    Png,
    /// JPEG (no transparency, alpha is dropped)
    Jpeg,
}

/// Where run artifacts are held until consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStorage {
    /// Files inside a per-run temporary directory
    #[default]
    Disk,
    /// In-memory buffers
    Memory,
}

/// Compression method for archive entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveCompression {
    #[default]
    Deflated,
    Stored,
}

/// User-facing background choice, resolved into a [`BackgroundSpec`] per run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", content = "value", rename_all = "lowercase")]
pub enum BackgroundChoice {
    /// Keep the cut-out transparent
    #[default]
    Transparent,
    /// Hex color such as `#FFFFFF`
    Color(String),
    /// Custom background image file
    Image(PathBuf),
    /// The configured banner image
    Banner,
}

impl BackgroundChoice {
    /// Resolve into a background specification
    ///
    /// `Banner` resolves to `config.banner_path`. Image files are not opened here;
    /// an unreadable background surfaces as a per-item composite failure.
    ///
    /// # Errors
    /// - Invalid hex color
    pub fn resolve(&self, config: &PipelineConfig) -> Result<BackgroundSpec> {
        match self {
            Self::Transparent => Ok(BackgroundSpec::None),
            Self::Color(hex) => parse_hex_color(hex).map(BackgroundSpec::SolidColor),
            Self::Image(path) => Ok(BackgroundSpec::Image(ImageSource::Path(path.clone()))),
            Self::Banner => Ok(BackgroundSpec::Image(ImageSource::Path(
                config.banner_path.clone(),
            ))),
        }
    }
}

/// Configuration for a batch pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum number of items per batch (`None` = unlimited)
    pub max_batch_size: Option<usize>,

    /// Maximum encoded size of one item in bytes (`None` = unlimited)
    pub max_item_bytes: Option<u64>,

    /// Suffix appended to the input stem to name outputs
    pub output_suffix: String,

    /// Output format
    pub output_format: OutputFormat,

    /// JPEG quality (0-100, only used for JPEG output)
    pub jpeg_quality: u8,

    /// Artifact storage mode
    pub artifact_storage: ArtifactStorage,

    /// Parent directory for per-run workspaces (None = system temp)
    pub work_dir: Option<PathBuf>,

    /// Also keep the transparent cut-out when a background is applied
    pub keep_cutout: bool,

    /// Image used by [`BackgroundChoice::Banner`]
    pub banner_path: PathBuf,

    /// Archive entry compression
    pub archive_compression: ArchiveCompression,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_batch_size: Some(DEFAULT_MAX_BATCH_SIZE),
            max_item_bytes: Some(DEFAULT_MAX_ITEM_BYTES),
            output_suffix: "_processed".to_string(),
            output_format: OutputFormat::default(),
            jpeg_quality: 90,
            artifact_storage: ArtifactStorage::default(),
            work_dir: None,
            keep_cutout: false,
            banner_path: PathBuf::from("banners/banner-galaxia.jpeg"),
            archive_compression: ArchiveCompression::default(),
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder
    ///
    /// ```rust
    /// use bgremove_studio::{OutputFormat, PipelineConfig};
    ///
    /// let config = PipelineConfig::builder()
    ///     .max_batch_size(Some(25))
    ///     .output_format(OutputFormat::Jpeg)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.max_batch_size, Some(25));
    /// ```
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - JPEG quality above 100
    /// - Zero batch or item limits
    /// - Empty output suffix or one containing path separators
    pub fn validate(&self) -> Result<()> {
        if self.jpeg_quality > 100 {
            return Err(BgStudioError::config_value_error(
                "JPEG quality",
                self.jpeg_quality,
                "0-100",
                Some(90),
            ));
        }

        if self.max_batch_size == Some(0) {
            return Err(BgStudioError::config_value_error(
                "max batch size",
                0,
                ">= 1",
                Some(DEFAULT_MAX_BATCH_SIZE),
            ));
        }

        if self.max_item_bytes == Some(0) {
            return Err(BgStudioError::config_value_error(
                "max item bytes",
                0,
                ">= 1",
                Some(DEFAULT_MAX_ITEM_BYTES),
            ));
        }

        if self.output_suffix.is_empty() || self.output_suffix.contains(['/', '\\']) {
            return Err(BgStudioError::invalid_config(format!(
                "Output suffix '{}' must be non-empty and contain no path separators",
                self.output_suffix
            )));
        }

        Ok(())
    }

    /// File extension matching the output format
    #[must_use]
    pub fn output_extension(&self) -> &'static str {
        crate::services::OutputFormatHandler::get_extension(self.output_format)
    }

    /// Output file name for an input stem (`cat` -> `cat_processed.png`)
    #[must_use]
    pub fn output_name(&self, stem: &str) -> String {
        format!("{}{}.{}", stem, self.output_suffix, self.output_extension())
    }
}

/// Builder for `PipelineConfig`
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    #[must_use]
    pub fn max_batch_size(mut self, limit: Option<usize>) -> Self {
        self.config.max_batch_size = limit;
        self
    }

    #[must_use]
    pub fn max_item_bytes(mut self, limit: Option<u64>) -> Self {
        self.config.max_item_bytes = limit;
        self
    }

    #[must_use]
    pub fn output_suffix<S: Into<String>>(mut self, suffix: S) -> Self {
        self.config.output_suffix = suffix.into();
        self
    }

    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    /// Set JPEG quality, clamped to 100
    #[must_use]
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.min(100);
        self
    }

    #[must_use]
    pub fn artifact_storage(mut self, storage: ArtifactStorage) -> Self {
        self.config.artifact_storage = storage;
        self
    }

    #[must_use]
    pub fn work_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.work_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn keep_cutout(mut self, keep: bool) -> Self {
        self.config.keep_cutout = keep;
        self
    }

    #[must_use]
    pub fn banner_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.banner_path = path.into();
        self
    }

    #[must_use]
    pub fn archive_compression(mut self, compression: ArchiveCompression) -> Self {
        self.config.archive_compression = compression;
        self
    }

    /// Build the configuration with validation
    ///
    /// # Errors
    /// - Any rule checked by [`PipelineConfig::validate`]
    pub fn build(self) -> Result<PipelineConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}
