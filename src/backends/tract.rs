//! Tract backend for segmentation models
//!
//! Pure Rust inference with no native runtime; CPU only.

use crate::error::{BgStudioError, Result};
use crate::inference::{primary_mask, InferenceBackend};
use crate::models::ModelSpec;
use instant::{Duration, Instant};
use ndarray::Array4;
use tract_onnx::prelude::*;

type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract backend
#[derive(Debug, Default)]
pub struct TractBackend {
    model: Option<TractModel>,
    input_side: usize,
}

impl TractBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn load_model(&mut self, spec: &ModelSpec) -> Result<Duration> {
        let model_load_start = Instant::now();
        let model_data = spec.load_bytes()?;
        let side = spec.preprocessing.target_size[0] as usize;

        // Pin the input fact so graphs with symbolic dimensions can be optimized
        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .map_err(|e| BgStudioError::model(format!("Failed to load ONNX model: {e}")))?
            .with_input_fact(0, f32::fact([1, 3, side, side]).into())
            .map_err(|e| BgStudioError::model(format!("Failed to set input shape: {e}")))?
            .into_optimized()
            .map_err(|e| BgStudioError::model(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| BgStudioError::model(format!("Failed to create runnable model: {e}")))?;

        self.model = Some(model);
        self.input_side = side;

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "Tract backend initialized with {} in {}ms",
            spec.display_name(),
            model_load_time.as_millis()
        );
        Ok(model_load_time)
    }
}

impl InferenceBackend for TractBackend {
    fn initialize(&mut self, model: &ModelSpec) -> Result<Option<Duration>> {
        if self.model.is_some() {
            return Ok(None);
        }
        self.load_model(model).map(Some)
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| BgStudioError::inference("Tract model not initialized"))?;

        let inference_start = Instant::now();
        let data: Vec<f32> = input.iter().copied().collect();
        let input_tensor = Tensor::from_shape(input.shape(), &data)
            .map_err(|e| BgStudioError::inference(format!("Failed to build input tensor: {e}")))?;

        let outputs = model
            .run(tvec![input_tensor.into()])
            .map_err(|e| BgStudioError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| BgStudioError::inference("No output tensor found"))?
            .into_arc_tensor();
        let output_view = output_tensor.to_array_view::<f32>().map_err(|e| {
            BgStudioError::inference(format!("Failed to convert output tensor: {e}"))
        })?;
        let values: Vec<f32> = output_view.iter().copied().collect();

        log::debug!(
            "Tract inference completed in {}ms",
            inference_start.elapsed().as_millis()
        );
        primary_mask(values, self.input_side)
    }

    fn is_initialized(&self) -> bool {
        self.model.is_some()
    }

    fn name(&self) -> &'static str {
        "tract"
    }
}
