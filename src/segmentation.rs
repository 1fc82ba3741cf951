//! Background segmentation adapters
//!
//! The pipeline treats segmentation as an opaque collaborator: an image goes in,
//! the same image comes back with background pixels made transparent. Any type
//! implementing [`Segmenter`] can be plugged in; [`ModelSegmenter`] runs an ONNX
//! salient-object model through one of the [`InferenceBackend`]s.

use crate::{
    config::ExecutionProvider,
    error::{BgStudioError, Result},
    inference::InferenceBackend,
    models::ModelSpec,
    utils::ImagePreprocessor,
};
use image::{DynamicImage, GenericImageView, RgbaImage};
use instant::Instant;
use tracing::{debug, info, instrument, span, Level};

/// Removes the background of a single image
pub trait Segmenter: Send {
    /// Return `image` with an alpha channel marking foreground pixels
    ///
    /// The result must have the same width and height as the input.
    ///
    /// # Errors
    /// - The image cannot be segmented
    fn remove_background(&mut self, image: &DynamicImage) -> Result<RgbaImage>;

    /// Name for logs and reports
    fn name(&self) -> &str;
}

impl<S: Segmenter + ?Sized> Segmenter for Box<S> {
    fn remove_background(&mut self, image: &DynamicImage) -> Result<RgbaImage> {
        (**self).remove_background(image)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Segmenter backed by a closure
pub struct FnSegmenter<F> {
    name: String,
    func: F,
}

impl<F> FnSegmenter<F>
where
    F: FnMut(&DynamicImage) -> Result<RgbaImage> + Send,
{
    pub fn new<S: Into<String>>(name: S, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Segmenter for FnSegmenter<F>
where
    F: FnMut(&DynamicImage) -> Result<RgbaImage> + Send,
{
    fn remove_background(&mut self, image: &DynamicImage) -> Result<RgbaImage> {
        (self.func)(image)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<F> std::fmt::Debug for FnSegmenter<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnSegmenter").field("name", &self.name).finish()
    }
}

/// Segmenter running an ONNX model through an inference backend
///
/// The backend is initialized lazily on the first image.
#[derive(Debug)]
pub struct ModelSegmenter<B> {
    backend: B,
    model: ModelSpec,
    name: String,
}

impl<B: InferenceBackend> ModelSegmenter<B> {
    pub fn new(backend: B, model: ModelSpec) -> Self {
        let name = format!("{}/{}", backend.name(), model.display_name());
        Self {
            backend,
            model,
            name,
        }
    }

    #[must_use]
    pub fn model(&self) -> &ModelSpec {
        &self.model
    }

    /// Load the model now instead of on the first image
    ///
    /// # Errors
    /// - Model loading failures
    pub fn initialize(&mut self) -> Result<()> {
        if let Some(load_time) = self.backend.initialize(&self.model)? {
            info!(
                model = %self.model.display_name(),
                load_ms = load_time.as_millis() as u64,
                "Segmentation model ready"
            );
        }
        Ok(())
    }
}

impl<B: InferenceBackend> Segmenter for ModelSegmenter<B> {
    #[instrument(
        skip(self, image),
        fields(
            backend = self.backend.name(),
            dimensions = %format!("{}x{}", image.width(), image.height())
        )
    )]
    fn remove_background(&mut self, image: &DynamicImage) -> Result<RgbaImage> {
        if !self.backend.is_initialized() {
            self.initialize()
                .map_err(|e| BgStudioError::segmentation(e.to_string()))?;
        }

        let start = Instant::now();
        let original_dimensions = image.dimensions();

        let (input_tensor, geometry) = {
            let _span = span!(Level::DEBUG, "preprocessing").entered();
            ImagePreprocessor::preprocess_for_inference(image, &self.model.preprocessing)?
        };

        let output_tensor = {
            let _span = span!(Level::DEBUG, "inference").entered();
            self.backend
                .infer(&input_tensor)
                .map_err(|e| BgStudioError::segmentation(e.to_string()))?
        };

        let mut mask = ImagePreprocessor::tensor_to_mask(&output_tensor, &geometry, original_dimensions)
            .map_err(|e| BgStudioError::segmentation(e.to_string()))?;
        if self.model.family.normalizes_output() {
            mask = mask.normalized();
        }

        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "Mask applied");
        Ok(mask.apply_to(image))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Inference engine used by [`create_segmenter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendType {
    /// ONNX Runtime backend (supports GPU acceleration)
    #[default]
    Onnx,
    /// Tract backend (pure Rust, no external dependencies)
    Tract,
}

impl std::str::FromStr for BackendType {
    type Err = BgStudioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "onnx" => Ok(Self::Onnx),
            "tract" => Ok(Self::Tract),
            other => Err(BgStudioError::invalid_config(format!(
                "Unknown backend '{}'. Expected 'onnx' or 'tract'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
        }
    }
}

/// Backends compiled into this build
#[must_use]
pub fn available_backends() -> Vec<BackendType> {
    let mut backends = Vec::new();
    #[cfg(feature = "onnx")]
    backends.push(BackendType::Onnx);
    #[cfg(feature = "tract")]
    backends.push(BackendType::Tract);
    backends
}

/// Build a model-backed segmenter for the requested backend
///
/// # Errors
/// - Backend not compiled into this build
#[allow(unused_variables)]
pub fn create_segmenter(
    backend: BackendType,
    model: ModelSpec,
    execution_provider: ExecutionProvider,
) -> Result<Box<dyn Segmenter>> {
    match backend {
        #[cfg(feature = "onnx")]
        BackendType::Onnx => Ok(Box::new(ModelSegmenter::new(
            crate::backends::OnnxBackend::new(execution_provider),
            model,
        ))),
        #[cfg(feature = "tract")]
        BackendType::Tract => Ok(Box::new(ModelSegmenter::new(
            crate::backends::TractBackend::new(),
            model,
        ))),
        #[allow(unreachable_patterns)]
        other => Err(BgStudioError::invalid_config(format!(
            "Backend '{}' is not enabled in this build",
            other
        ))),
    }
}
