//! Mock inference backend for exercising segmentation without model files

use crate::{
    error::{BgStudioError, Result},
    inference::InferenceBackend,
    models::ModelSpec,
};
use instant::Duration;
use ndarray::Array4;
use std::sync::{Arc, Mutex};

/// Mock backend emitting a centered disc as foreground
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    side: usize,
    /// Scale applied to mask values, to imitate unnormalized saliency outputs
    peak: f32,
    call_history: Arc<Mutex<Vec<String>>>,
    should_fail_init: bool,
    should_fail_inference: bool,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            peak: 1.0,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn new_failing_init() -> Self {
        Self {
            should_fail_init: true,
            ..Self::new()
        }
    }

    #[must_use]
    pub fn new_failing_inference() -> Self {
        Self {
            should_fail_inference: true,
            ..Self::new()
        }
    }

    /// Mask values peak at `peak` instead of 1.0
    #[must_use]
    pub fn with_peak(mut self, peak: f32) -> Self {
        self.peak = peak;
        self
    }

    pub fn get_call_history(&self) -> Vec<String> {
        self.call_history.lock().unwrap().clone()
    }

    fn record_call(&self, method: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(method.to_string());
        }
    }

    fn disc(&self) -> Array4<f32> {
        let side = self.side;
        let center = side as f32 / 2.0;
        let radius = side as f32 / 3.0;
        Array4::from_shape_fn((1, 1, side, side), |(_, _, y, x)| {
            let dx = x as f32 + 0.5 - center;
            let dy = y as f32 + 0.5 - center;
            if (dx * dx + dy * dy).sqrt() < radius {
                self.peak
            } else {
                0.0
            }
        })
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, model: &ModelSpec) -> Result<Option<Duration>> {
        self.record_call("initialize");
        if self.should_fail_init {
            return Err(BgStudioError::model("Mock initialization failure"));
        }
        if self.side != 0 {
            return Ok(None);
        }
        self.side = model.preprocessing.target_size[0] as usize;
        Ok(Some(Duration::from_millis(1)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.record_call("infer");
        if self.side == 0 {
            return Err(BgStudioError::inference("Mock backend not initialized"));
        }
        if self.should_fail_inference {
            return Err(BgStudioError::inference("Mock inference failure"));
        }
        if input.shape() != [1, 3, self.side, self.side] {
            return Err(BgStudioError::inference(format!(
                "Unexpected input shape {:?}",
                input.shape()
            )));
        }
        Ok(self.disc())
    }

    fn is_initialized(&self) -> bool {
        self.side != 0
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
