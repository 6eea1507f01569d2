//! Canonical pixel representation and byte decoding
//!
//! Everything downstream of this module operates on one pixel layout: RGBA8
//! with known dimensions. Decoding fails fast on corrupt or unsupported
//! bytes, before any model work is attempted, and EXIF orientation is baked
//! into the pixel data so no later stage reasons about metadata.

use crate::error::MatteError;
use image::{DynamicImage, ImageDecoder, ImageReader, RgbaImage};
use std::io::Cursor;

/// Number of channels in the canonical layout
pub const CANONICAL_CHANNELS: u32 = 4;

/// Decoded pixel buffer in the pipeline's single internal representation
///
/// Always RGBA; inputs without an alpha channel get fully opaque alpha.
/// Owned exclusively by the current request, never shared.
#[derive(Debug, Clone)]
pub struct CanonicalImage {
    /// Raw RGBA bytes, row-major, `width * height * 4` long
    pub data: Vec<u8>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl CanonicalImage {
    /// Decode arbitrary image bytes into the canonical layout
    ///
    /// # Errors
    ///
    /// Returns `MatteError::ImageDecode` when the bytes are not a decodable
    /// image in a supported format.
    pub fn decode(bytes: &[u8]) -> Result<Self, MatteError> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| MatteError::decode(format!("unable to probe image format: {e}")))?;

        let mut decoder = reader
            .into_decoder()
            .map_err(|e| MatteError::decode(format!("unsupported or corrupt image: {e}")))?;

        // Orientation must be read before the decoder is consumed.
        let orientation = decoder
            .orientation()
            .map_err(|e| MatteError::decode(format!("failed to read orientation: {e}")))?;

        let mut image = DynamicImage::from_decoder(decoder)
            .map_err(|e| MatteError::decode(format!("failed to decode image: {e}")))?;
        image.apply_orientation(orientation);

        Ok(Self::from_dynamic(&image))
    }

    /// Convert a decoded image into the canonical layout. `to_rgba8` fills
    /// the alpha channel with 255 for alpha-less sources.
    #[must_use]
    pub fn from_dynamic(image: &DynamicImage) -> Self {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self {
            data: rgba.into_raw(),
            width,
            height,
        }
    }

    /// Conversion boundary back to the `image` crate's RGBA buffer
    ///
    /// # Errors
    ///
    /// Returns `MatteError::ImageDecode` if the byte length does not match
    /// the recorded dimensions.
    pub fn to_rgba_image(&self) -> Result<RgbaImage, MatteError> {
        RgbaImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            MatteError::decode(format!(
                "canonical buffer length {} does not match {}x{} RGBA",
                self.data.len(),
                self.width,
                self.height
            ))
        })
    }

    /// Dimensions as `(width, height)`
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Total pixel count
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}
