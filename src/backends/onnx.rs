//! ONNX Runtime backend for segmentation models
//!
//! Supports CPU, CUDA and `CoreML` execution providers, falling back to CPU when
//! a requested accelerator is unavailable.

use crate::config::ExecutionProvider;
use crate::error::{BgStudioError, Result};
use crate::inference::{primary_mask, InferenceBackend};
use crate::models::ModelSpec;
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::{self, value::Value};

/// ONNX Runtime backend
#[derive(Debug)]
pub struct OnnxBackend {
    session: Option<Session>,
    execution_provider: ExecutionProvider,
    mask_side: usize,
}

impl OnnxBackend {
    #[must_use]
    pub fn new(execution_provider: ExecutionProvider) -> Self {
        Self {
            session: None,
            execution_provider,
            mask_side: 0,
        }
    }

    /// Execution providers with their availability, for diagnostics
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool)> {
        vec![
            ("CPU".to_string(), true),
            (
                "CUDA".to_string(),
                OrtExecutionProvider::is_available(&CUDAExecutionProvider::default())
                    .unwrap_or(false),
            ),
            (
                "CoreML".to_string(),
                OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                    .unwrap_or(false),
            ),
        ]
    }

    fn providers(&self) -> Vec<ExecutionProviderDispatch> {
        let cuda = || {
            let provider = CUDAExecutionProvider::default();
            if OrtExecutionProvider::is_available(&provider).unwrap_or(false) {
                log::info!("Using CUDA execution provider");
                Some(provider.build())
            } else {
                None
            }
        };
        let coreml = || {
            let provider = CoreMLExecutionProvider::default();
            if OrtExecutionProvider::is_available(&provider).unwrap_or(false) {
                log::info!("Using CoreML execution provider");
                Some(CoreMLExecutionProvider::default().with_subgraphs(true).build())
            } else {
                None
            }
        };

        let selected: Vec<_> = match self.execution_provider {
            ExecutionProvider::Auto => [cuda(), coreml()].into_iter().flatten().collect(),
            ExecutionProvider::Cuda => cuda().into_iter().collect(),
            ExecutionProvider::CoreMl => coreml().into_iter().collect(),
            ExecutionProvider::Cpu => Vec::new(),
        };

        if selected.is_empty() && self.execution_provider != ExecutionProvider::Cpu {
            log::warn!(
                "{} execution provider not available, falling back to CPU",
                self.execution_provider
            );
        }
        selected
    }

    fn load_model(&mut self, model: &ModelSpec) -> Result<std::time::Duration> {
        let model_load_start = std::time::Instant::now();
        let model_data = model.load_bytes()?;

        let mut session_builder = Session::builder()
            .map_err(|e| {
                BgStudioError::model(format!("Failed to create session builder: {e}"))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                BgStudioError::model(format!("Failed to set optimization level: {e}"))
            })?;

        let providers = self.providers();
        if !providers.is_empty() {
            session_builder = session_builder
                .with_execution_providers(providers)
                .map_err(|e| {
                    BgStudioError::model(format!("Failed to set execution providers: {e}"))
                })?;
        }

        let session = session_builder.commit_from_memory(&model_data).map_err(|e| {
            BgStudioError::model(format!(
                "Failed to create session from {}: {e}",
                model.path.display()
            ))
        })?;

        self.session = Some(session);
        self.mask_side = model.preprocessing.target_size[0] as usize;

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "Model {} loaded in {:.0}ms",
            model.display_name(),
            model_load_time.as_secs_f64() * 1000.0
        );
        Ok(model_load_time)
    }
}

impl Default for OnnxBackend {
    fn default() -> Self {
        Self::new(ExecutionProvider::Auto)
    }
}

impl InferenceBackend for OnnxBackend {
    fn initialize(&mut self, model: &ModelSpec) -> Result<Option<std::time::Duration>> {
        if self.session.is_some() {
            return Ok(None);
        }
        self.load_model(model).map(Some)
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let side = self.mask_side;
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| BgStudioError::inference("ONNX session not initialized"))?;

        let inference_start = std::time::Instant::now();
        let input_value = Value::from_array(input.clone()).map_err(|e| {
            BgStudioError::inference(format!("Failed to convert input tensor: {e}"))
        })?;

        // Positional input and first output; tensor names differ between exports
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| BgStudioError::inference(format!("ONNX inference failed: {e}")))?;

        let first_key = outputs
            .keys()
            .next()
            .map(ToString::to_string)
            .ok_or_else(|| BgStudioError::inference("No output tensors found"))?;
        let output_tensor = outputs
            .get(first_key.as_str())
            .ok_or_else(|| BgStudioError::inference("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| BgStudioError::inference(format!("Failed to extract output tensor: {e}")))?;

        let values: Vec<f32> = output_tensor.iter().copied().collect();
        log::debug!(
            "ONNX inference: {:.2}ms, output shape {:?}",
            inference_start.elapsed().as_secs_f64() * 1000.0,
            output_tensor.shape()
        );

        primary_mask(values, side)
    }

    fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    fn name(&self) -> &'static str {
        "onnx"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelFamily;

    #[test]
    fn test_infer_before_initialize_fails() {
        let mut backend = OnnxBackend::default();
        assert!(!backend.is_initialized());
        let input = Array4::<f32>::zeros((1, 3, 4, 4));
        assert!(backend.infer(&input).is_err());
    }

    #[test]
    fn test_initialize_with_missing_model() {
        let mut backend = OnnxBackend::new(ExecutionProvider::Cpu);
        let spec = ModelSpec::new("/nonexistent/model.onnx", ModelFamily::U2Net);
        let err = backend.initialize(&spec).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Model);
    }
}
