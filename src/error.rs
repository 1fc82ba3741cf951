//! Error types for background removal and compositing operations

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, BgStudioError>;

/// Comprehensive error types for the batch pipeline
#[derive(Error, Debug)]
pub enum BgStudioError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Segmentation adapter failed on an item
    #[error("Segmentation error: {0}")]
    Segmentation(String),

    /// Blend or resize failure, including an unusable background image
    #[error("Composite error: {0}")]
    Composite(String),

    /// Image could not be decoded or encoded
    #[error("Codec error: {0}")]
    Codec(String),

    /// Input item refused before decoding (size guard)
    #[error("Input rejected: {0}")]
    InputRejected(String),

    /// Batch-size guard
    #[error("Too many items: {count} supplied, at most {limit} allowed per batch")]
    TooManyItems { count: usize, limit: usize },

    /// Archive assembly failure
    #[error("Archive error: {0}")]
    Archive(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Model loading or initialization errors
    #[error("Model error: {0}")]
    Model(String),

    /// Backend inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Artifact handle no longer registered with its run
    #[error("Artifact released: {0}")]
    ArtifactReleased(String),

    /// Run was cancelled before the item was attempted
    #[error("Cancelled before processing")]
    Cancelled,
}

/// Coarse classification of errors, recorded on failed items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Segmentation,
    Composite,
    Codec,
    InputRejected,
    Cancelled,
    TooManyItems,
    Archive,
    Io,
    InvalidConfig,
    Model,
    Inference,
    ArtifactReleased,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Segmentation => "segmentation",
            Self::Composite => "composite",
            Self::Codec => "codec",
            Self::InputRejected => "input rejected",
            Self::Cancelled => "cancelled",
            Self::TooManyItems => "too many items",
            Self::Archive => "archive",
            Self::Io => "io",
            Self::InvalidConfig => "invalid configuration",
            Self::Model => "model",
            Self::Inference => "inference",
            Self::ArtifactReleased => "artifact released",
        };
        f.write_str(name)
    }
}

impl From<image::ImageError> for BgStudioError {
    fn from(error: image::ImageError) -> Self {
        Self::Codec(error.to_string())
    }
}

impl From<zip::result::ZipError> for BgStudioError {
    fn from(error: zip::result::ZipError) -> Self {
        Self::Archive(error.to_string())
    }
}

impl BgStudioError {
    /// Create a new segmentation error
    pub fn segmentation<S: Into<String>>(msg: S) -> Self {
        Self::Segmentation(msg.into())
    }

    /// Create a new composite error
    pub fn composite<S: Into<String>>(msg: S) -> Self {
        Self::Composite(msg.into())
    }

    /// Create a new codec error
    pub fn codec<S: Into<String>>(msg: S) -> Self {
        Self::Codec(msg.into())
    }

    /// Create a new archive error
    pub fn archive<S: Into<String>>(msg: S) -> Self {
        Self::Archive(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Create codec error with stage context
    pub fn codec_stage_error(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let input_context = match input_info {
            Some(info) => format!(" (input: {})", info),
            None => String::new(),
        };

        Self::Codec(format!(
            "Failed at stage '{}'{}: {}",
            stage, input_context, details
        ))
    }

    /// Classification of this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Io,
            Self::Segmentation(_) => ErrorKind::Segmentation,
            Self::Composite(_) => ErrorKind::Composite,
            Self::Codec(_) => ErrorKind::Codec,
            Self::InputRejected(_) => ErrorKind::InputRejected,
            Self::TooManyItems { .. } => ErrorKind::TooManyItems,
            Self::Archive(_) => ErrorKind::Archive,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::Model(_) => ErrorKind::Model,
            Self::Inference(_) => ErrorKind::Inference,
            Self::ArtifactReleased(_) => ErrorKind::ArtifactReleased,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}
