//! Alpha-mask resolution from raw model output
//!
//! Converts the model's pre-activation score tensor into a per-pixel 8-bit
//! alpha mask at the source image's exact resolution: elementwise sigmoid,
//! `round(p * 255)` quantization, then an interpolated resample. The
//! resample is unconditional, even when the working and source resolutions
//! coincide, so there is a single tested code path.

use crate::error::MatteError;
use image::{
    imageops::{self, FilterType},
    ImageBuffer, Luma,
};
use ndarray::Array4;
use serde::{Deserialize, Serialize};

/// Single-channel 8-bit opacity mask
///
/// 0 is fully transparent, 255 fully opaque. Produced at the model's working
/// resolution and immediately resampled to the source resolution; every
/// stage after resolution operates at source resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlphaMask {
    /// Mask bytes, row-major, one per pixel
    pub data: Vec<u8>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl AlphaMask {
    /// Resolve a raw probability tensor into a mask at `target` resolution
    ///
    /// The tensor is expected in NCHW layout with a single batch and a
    /// single channel.
    ///
    /// # Errors
    ///
    /// Returns `MatteError::MaskResolution` for degenerate tensor
    /// dimensions (zero height/width, batch != 1, channels != 1) or a
    /// degenerate target resolution.
    pub fn resolve(tensor: &Array4<f32>, target: (u32, u32)) -> Result<Self, MatteError> {
        let shape = tensor.shape();
        let (batch, channels, height, width) = (
            shape.first().copied().unwrap_or(0),
            shape.get(1).copied().unwrap_or(0),
            shape.get(2).copied().unwrap_or(0),
            shape.get(3).copied().unwrap_or(0),
        );

        if batch != 1 || channels != 1 {
            return Err(MatteError::mask(format!(
                "expected tensor shape [1, 1, h, w], got [{batch}, {channels}, {height}, {width}]"
            )));
        }
        if height == 0 || width == 0 {
            return Err(MatteError::mask(format!(
                "degenerate tensor resolution {width}x{height}"
            )));
        }
        let (target_w, target_h) = target;
        if target_w == 0 || target_h == 0 {
            return Err(MatteError::mask(format!(
                "degenerate target resolution {target_w}x{target_h}"
            )));
        }

        // Activation + quantization at working resolution.
        let mut quantized = Vec::with_capacity(width * height);
        for value in tensor.iter() {
            quantized.push(quantize(sigmoid(*value)));
        }

        let working: ImageBuffer<Luma<u8>, Vec<u8>> =
            ImageBuffer::from_raw(width as u32, height as u32, quantized).ok_or_else(|| {
                MatteError::mask("tensor element count does not match its shape")
            })?;

        // Mandatory resample, uniform code path regardless of resolutions.
        let resampled = imageops::resize(&working, target_w, target_h, FilterType::Lanczos3);

        Ok(Self {
            data: resampled.into_raw(),
            width: target_w,
            height: target_h,
        })
    }

    /// The complementary mask: `255 - alpha` at every pixel
    #[must_use]
    pub fn inverted(&self) -> Self {
        Self {
            data: self.data.iter().map(|a| 255 - a).collect(),
            width: self.width,
            height: self.height,
        }
    }

    /// Dimensions as `(width, height)`
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Aggregate opacity statistics, used for determinism checks and
    /// diagnostics
    #[must_use]
    pub fn statistics(&self) -> MaskStatistics {
        let total = self.data.len();
        let transparent = self.data.iter().filter(|&&a| a == 0).count();
        let opaque = self.data.iter().filter(|&&a| a == 255).count();

        MaskStatistics {
            total_pixels: total,
            transparent_pixels: transparent,
            opaque_pixels: opaque,
            partial_pixels: total - transparent - opaque,
        }
    }

    /// View the mask as a grayscale image buffer
    ///
    /// # Errors
    ///
    /// Returns `MatteError::MaskResolution` if the byte length does not
    /// match the recorded dimensions.
    pub fn to_image(&self) -> Result<ImageBuffer<Luma<u8>, Vec<u8>>, MatteError> {
        ImageBuffer::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            MatteError::mask(format!(
                "mask buffer length {} does not match {}x{}",
                self.data.len(),
                self.width,
                self.height
            ))
        })
    }
}

/// Counts of fully-transparent, fully-opaque and partial pixels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    pub transparent_pixels: usize,
    pub opaque_pixels: usize,
    pub partial_pixels: usize,
}

/// Numerically stable logistic function
fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// `round(p * 255)` clipped to the byte range
fn quantize(p: f32) -> u8 {
    (p * 255.0).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[test]
    fn test_sigmoid_bounds() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(40.0) > 0.999_99);
        assert!(sigmoid(-40.0) < 1e-5);
        // Extreme logits must not overflow to NaN.
        assert!(sigmoid(1000.0).is_finite());
        assert!(sigmoid(-1000.0).is_finite());
    }

    #[test]
    fn test_quantization_endpoints() {
        assert_eq!(quantize(0.0), 0);
        assert_eq!(quantize(1.0), 255);
        assert_eq!(quantize(0.5), 128);
    }

    #[test]
    fn test_resolve_same_resolution() {
        // Strongly positive logits resolve to an all-opaque mask.
        let tensor = Array4::from_elem((1, 1, 4, 4), 50.0_f32);
        let mask = AlphaMask::resolve(&tensor, (4, 4)).unwrap();
        assert_eq!(mask.dimensions(), (4, 4));
        assert!(mask.data.iter().all(|&a| a == 255));
    }

    #[test]
    fn test_resolve_resamples_to_target() {
        let tensor = Array4::from_elem((1, 1, 8, 8), -50.0_f32);
        let mask = AlphaMask::resolve(&tensor, (20, 10)).unwrap();
        assert_eq!(mask.dimensions(), (20, 10));
        assert_eq!(mask.data.len(), 200);
        assert!(mask.data.iter().all(|&a| a == 0));
    }

    #[test]
    fn test_resolve_rejects_bad_shapes() {
        let two_channels = Array4::<f32>::zeros((1, 2, 4, 4));
        assert!(matches!(
            AlphaMask::resolve(&two_channels, (4, 4)),
            Err(MatteError::MaskResolution(_))
        ));

        let batched = Array4::<f32>::zeros((2, 1, 4, 4));
        assert!(AlphaMask::resolve(&batched, (4, 4)).is_err());

        let empty = Array4::<f32>::zeros((1, 1, 0, 4));
        assert!(AlphaMask::resolve(&empty, (4, 4)).is_err());

        let valid = Array4::<f32>::zeros((1, 1, 4, 4));
        assert!(AlphaMask::resolve(&valid, (0, 4)).is_err());
    }

    #[test]
    fn test_inversion_is_exact_complement() {
        let tensor =
            Array4::from_shape_fn((1, 1, 6, 6), |(_, _, y, x)| (x as f32 - y as f32) * 0.7);
        let mask = AlphaMask::resolve(&tensor, (6, 6)).unwrap();
        let inverse = mask.inverted();

        for (a, b) in mask.data.iter().zip(inverse.data.iter()) {
            assert_eq!(u16::from(*a) + u16::from(*b), 255);
        }
        // Double inversion is the identity.
        assert_eq!(inverse.inverted().data, mask.data);
    }

    #[test]
    fn test_statistics() {
        let mask = AlphaMask {
            data: vec![0, 0, 255, 128],
            width: 2,
            height: 2,
        };
        let stats = mask.statistics();
        assert_eq!(stats.total_pixels, 4);
        assert_eq!(stats.transparent_pixels, 2);
        assert_eq!(stats.opaque_pixels, 1);
        assert_eq!(stats.partial_pixels, 1);
    }
}
