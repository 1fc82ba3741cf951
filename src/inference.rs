//! Inference backend abstraction

use crate::{error::Result, models::ModelSpec};
use instant::Duration;
use ndarray::Array4;

/// A model runtime that turns a preprocessed NCHW tensor into a mask tensor
pub trait InferenceBackend: Send {
    /// Load the model and prepare the session
    ///
    /// Returns the time spent loading, if measured.
    ///
    /// # Errors
    /// - Model file missing or not a valid ONNX graph
    /// - Runtime session creation failures
    fn initialize(&mut self, model: &ModelSpec) -> Result<Option<Duration>>;

    /// Run inference on the input tensor
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Runtime inference failures or unexpected output shapes
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

/// Reshape a flat model output into `[1, 1, S, S]`
///
/// Models emit `[1, 1, S, S]`, `[1, S, S]` or several side outputs; the first
/// `S*S` values are the primary mask in every case.
///
/// # Errors
/// - Fewer values than the expected mask size
pub(crate) fn primary_mask(values: Vec<f32>, side: usize) -> Result<Array4<f32>> {
    let needed = side * side;
    if values.len() < needed {
        return Err(crate::error::BgStudioError::inference(format!(
            "Model produced {} values, expected at least {}",
            values.len(),
            needed
        )));
    }
    let mut values = values;
    values.truncate(needed);
    Array4::from_shape_vec((1, 1, side, side), values)
        .map_err(|e| crate::error::BgStudioError::inference(format!("Invalid output shape: {}", e)))
}
