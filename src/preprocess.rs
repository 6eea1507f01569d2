//! Canonical-image to model-tensor conversion
//!
//! This is one half of the pipeline's explicit conversion boundary between
//! the compositing-facing pixel buffer and the model-facing tensor; the
//! other half (tensor to alpha mask) lives in [`crate::mask`].

use crate::{decode::CanonicalImage, error::MatteError, models::Preprocessor};
use image::imageops::{self, FilterType};
use ndarray::Array4;

/// Shared image preprocessing for inference
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Convert a canonical image into a normalized NCHW tensor at the
    /// model's working resolution.
    ///
    /// The image is resized (Triangle filter) to the working resolution and
    /// each RGB channel normalized with the profile's mean/std; alpha is
    /// dropped, the model consumes three channels.
    ///
    /// # Errors
    ///
    /// Returns `MatteError::Inference` when the canonical buffer is
    /// internally inconsistent or the working resolution is degenerate.
    pub fn to_tensor(
        image: &CanonicalImage,
        preprocessor: &Preprocessor,
    ) -> Result<Array4<f32>, MatteError> {
        let (work_w, work_h) = preprocessor.working_resolution();
        if work_w == 0 || work_h == 0 {
            return Err(MatteError::inference(format!(
                "degenerate working resolution {work_w}x{work_h}"
            )));
        }

        let rgba = image
            .to_rgba_image()
            .map_err(|e| MatteError::inference(format!("invalid canonical buffer: {e}")))?;
        let resized = imageops::resize(&rgba, work_w, work_h, FilterType::Triangle);

        let mut tensor = Array4::<f32>::zeros((1, 3, work_h as usize, work_w as usize));
        let mean = preprocessor.normalization_mean;
        let std = preprocessor.normalization_std;

        #[allow(clippy::indexing_slicing)] // tensor pre-allocated to the resized dimensions
        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            tensor[[0, 0, y, x]] = (f32::from(pixel[0]) / 255.0 - mean[0]) / std[0];
            tensor[[0, 1, y, x]] = (f32::from(pixel[1]) / 255.0 - mean[1]) / std[1];
            tensor[[0, 2, y, x]] = (f32::from(pixel[2]) / 255.0 - mean[2]) / std[2];
        }

        Ok(tensor)
    }
}
