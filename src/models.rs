//! Segmentation model descriptions

use crate::error::{BgStudioError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Input preparation parameters of a segmentation model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// Square input size `[width, height]`
    pub target_size: [u32; 2],
    /// Per-channel mean subtracted after scaling to 0-1
    pub normalization_mean: [f32; 3],
    /// Per-channel standard deviation
    pub normalization_std: [f32; 3],
}

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Known families of salient-object segmentation models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    /// U²-Net and its small variant (320x320, ImageNet normalization)
    #[default]
    U2Net,
    /// IS-Net / BRIA RMBG style models (1024x1024, centered normalization)
    IsNet,
}

impl ModelFamily {
    /// Default preprocessing for the family
    #[must_use]
    pub fn preprocessing(self) -> PreprocessingConfig {
        match self {
            Self::U2Net => PreprocessingConfig {
                target_size: [320, 320],
                normalization_mean: IMAGENET_MEAN,
                normalization_std: IMAGENET_STD,
            },
            Self::IsNet => PreprocessingConfig {
                target_size: [1024, 1024],
                normalization_mean: [0.5, 0.5, 0.5],
                normalization_std: [1.0, 1.0, 1.0],
            },
        }
    }

    /// Whether raw outputs need min-max stretching before use as alpha
    #[must_use]
    pub fn normalizes_output(self) -> bool {
        matches!(self, Self::U2Net)
    }
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::U2Net => write!(f, "u2net"),
            Self::IsNet => write!(f, "isnet"),
        }
    }
}

impl std::str::FromStr for ModelFamily {
    type Err = BgStudioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "u2net" | "u2netp" | "u2net_human_seg" => Ok(Self::U2Net),
            "isnet" | "rmbg" | "isnet-general-use" => Ok(Self::IsNet),
            other => Err(BgStudioError::invalid_config(format!(
                "Unknown model family '{}'. Expected 'u2net' or 'isnet'",
                other
            ))),
        }
    }
}

/// An ONNX segmentation model on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub path: PathBuf,
    pub family: ModelFamily,
    pub preprocessing: PreprocessingConfig,
}

impl ModelSpec {
    /// Describe a model file using the family's default preprocessing
    #[must_use]
    pub fn new<P: Into<PathBuf>>(path: P, family: ModelFamily) -> Self {
        Self {
            path: path.into(),
            family,
            preprocessing: family.preprocessing(),
        }
    }

    /// Override the model's input size
    #[must_use]
    pub fn with_input_size(mut self, size: u32) -> Self {
        self.preprocessing.target_size = [size, size];
        self
    }

    /// Short name for logs
    #[must_use]
    pub fn display_name(&self) -> String {
        format!(
            "{}:{}",
            self.family,
            self.path.file_name().unwrap_or_default().to_string_lossy()
        )
    }

    /// Read the model file
    ///
    /// # Errors
    /// - File missing or unreadable
    pub fn load_bytes(&self) -> Result<Vec<u8>> {
        Self::ensure_exists(&self.path)?;
        std::fs::read(&self.path)
            .map_err(|e| BgStudioError::file_io_error("read model file", &self.path, &e))
    }

    fn ensure_exists(path: &Path) -> Result<()> {
        if path.is_file() {
            Ok(())
        } else {
            Err(BgStudioError::model(format!(
                "Model file not found: {}",
                path.display()
            )))
        }
    }
}
