//! Inference backend abstraction

use crate::error::MatteError;
use ndarray::Array4;

/// Trait for segmentation inference backends
///
/// Implementations take `&self` so one loaded model can serve concurrent
/// requests; any interior session state is the implementation's concern.
pub trait InferenceBackend: Send + Sync {
    /// Run inference on a normalized NCHW input tensor
    ///
    /// The returned tensor holds raw, pre-activation scores at the model's
    /// working resolution with shape `[1, 1, h, w]`.
    ///
    /// # Errors
    ///
    /// - Model execution failures
    /// - The declared output tensor is absent or has an unexpected shape
    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>, MatteError>;

    /// Expected input shape, NCHW
    fn input_shape(&self) -> (usize, usize, usize, usize);

    /// Expected output shape, NCHW
    fn output_shape(&self) -> (usize, usize, usize, usize);
}
