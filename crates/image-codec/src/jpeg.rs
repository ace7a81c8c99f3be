//! JPEG codec for `DynamicImage`
//!
//! Images are stored at a fixed JPEG quality. JPEG has no alpha channel, so
//! images with transparency are flattened to RGB (or grey) before encoding.
//! Decoding guesses the format from the bytes, which lets freshly fetched
//! PNG or WebP data decode through the same codec.

use crate::error::{CodecError, Result};
use crate::ObjectCodec;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};

#[derive(Debug, Clone, Copy)]
pub struct JpegCodec {
    quality: u8,
}

impl JpegCodec {
    /// Highest quality the encoder offers
    pub const DEFAULT_QUALITY: u8 = 100;

    pub fn new() -> Self {
        Self {
            quality: Self::DEFAULT_QUALITY,
        }
    }

    /// Codec with a custom quality in `1..=100`
    pub fn with_quality(quality: u8) -> Result<Self> {
        if !(1..=100).contains(&quality) {
            return Err(CodecError::InvalidQuality(quality));
        }
        Ok(Self { quality })
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Default for JpegCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectCodec<DynamicImage> for JpegCodec {
    fn encode(&self, image: &DynamicImage) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut buffer, self.quality);

        let written = if image.color().has_color() {
            let rgb = image.to_rgb8();
            encoder.write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
        } else {
            let grey = image.to_luma8();
            encoder.write_image(grey.as_raw(), grey.width(), grey.height(), ExtendedColorType::L8)
        };
        written.map_err(|e| CodecError::Encode(Box::new(e)))?;

        Ok(buffer)
    }

    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage> {
        image::load_from_memory(bytes).map_err(|e| CodecError::Decode(Box::new(e)))
    }
}
