//! Alpha compositing and output encoding
//!
//! Foreground mode writes the mask straight into the alpha channel, leaving
//! RGB untouched. Background mode inverts the already-resolved mask and runs
//! the identical application path, so the two modes are complements by
//! construction rather than by separately derived masks.

use crate::{
    config::OutputMode,
    decode::CanonicalImage,
    error::MatteError,
    mask::AlphaMask,
};
use image::{
    codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder},
    ExtendedColorType, ImageEncoder,
};
use std::io::Cursor;

/// Encoded output of one matting run
///
/// Always a lossless, alpha-capable raster (PNG) at the source image's
/// dimensions, in both modes.
#[derive(Debug, Clone)]
pub struct CompositeResult {
    /// Encoded PNG bytes
    pub bytes: Vec<u8>,
    /// Width in pixels, equal to the canonical image's width
    pub width: u32,
    /// Height in pixels, equal to the canonical image's height
    pub height: u32,
}

impl CompositeResult {
    /// Dimensions as `(width, height)`
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Pixel-level compositor
pub struct Compositor;

impl Compositor {
    /// Merge a resolved mask into the original pixels and encode
    ///
    /// # Errors
    ///
    /// Returns `MatteError::Compositing` when mask and image dimensions
    /// disagree, and aborts before any encoding work.
    pub fn composite(
        image: &CanonicalImage,
        mask: &AlphaMask,
        mode: OutputMode,
        quality: u8,
    ) -> Result<CompositeResult, MatteError> {
        let applied = match mode {
            OutputMode::Foreground => Self::apply_alpha(image, mask)?,
            OutputMode::Background => Self::apply_alpha(image, &mask.inverted())?,
        };

        let bytes = Self::encode_png(&applied, image.width, image.height, quality)?;
        Ok(CompositeResult {
            bytes,
            width: image.width,
            height: image.height,
        })
    }

    /// Set each pixel's alpha to the corresponding mask byte, RGB unchanged
    fn apply_alpha(image: &CanonicalImage, mask: &AlphaMask) -> Result<Vec<u8>, MatteError> {
        if image.dimensions() != mask.dimensions() {
            return Err(MatteError::compositing(format!(
                "mask {}x{} does not match image {}x{}",
                mask.width, mask.height, image.width, image.height
            )));
        }

        let mut data = image.data.clone();
        for (pixel, alpha) in data.chunks_exact_mut(4).zip(mask.data.iter()) {
            if let Some(slot) = pixel.get_mut(3) {
                *slot = *alpha;
            }
        }
        Ok(data)
    }

    /// Encode RGBA bytes as PNG; `quality` selects compression effort only
    fn encode_png(data: &[u8], width: u32, height: u32, quality: u8) -> Result<Vec<u8>, MatteError> {
        let compression = match quality {
            0..=49 => CompressionType::Fast,
            50..=89 => CompressionType::Default,
            _ => CompressionType::Best,
        };

        let mut bytes = Vec::new();
        let encoder = PngEncoder::new_with_quality(
            Cursor::new(&mut bytes),
            compression,
            PngFilter::Adaptive,
        );
        encoder
            .write_image(data, width, height, ExtendedColorType::Rgba8)
            .map_err(|e| MatteError::compositing(format!("PNG encoding failed: {e}")))?;
        Ok(bytes)
    }
}
