//! Image decoding into an immutable RGB raster
//!
//! Accepts raw container bytes, base64 text, or a `data:` URI. Base64 padding
//! is optional and embedded whitespace is ignored. Payloads below the minimum
//! size are rejected before any codec runs. When the content-sniffing decode
//! fails, every supported codec is tried explicitly with decoder limits lifted.

use std::io::Cursor;

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};
use image::{imageops, DynamicImage, GrayImage, ImageFormat, ImageReader, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::vision::{grayscale, HsvImage};
use crate::DecodeError;

const DATA_URI_SCHEME: &[u8] = b"data:";

/// Minimum decoded payload size in bytes
pub const MIN_PAYLOAD_BYTES: usize = 100;

const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Tried in order; TGA has no signature and goes last
const FALLBACK_FORMATS: [ImageFormat; 7] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::WebP,
    ImageFormat::Bmp,
    ImageFormat::Gif,
    ImageFormat::Tiff,
    ImageFormat::Tga,
];

// ============================================================
// RASTER
// ============================================================

/// Decoded 3-channel pixel grid. Dimensions are fixed and pixels cannot be
/// mutated once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    pixels: RgbImage,
}

impl Raster {
    pub fn from_rgb(pixels: RgbImage) -> Self {
        Self { pixels }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pixel_count() == 0
    }

    #[inline]
    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn to_gray(&self) -> GrayImage {
        grayscale(&self.pixels)
    }

    pub fn to_hsv(&self) -> HsvImage {
        HsvImage::from_rgb(&self.pixels)
    }

    /// Rows from `floor(height * start)` to the bottom
    pub fn bottom_band(&self, start: f64) -> Raster {
        let top = ((self.height() as f64 * start.clamp(0.0, 1.0)) as u32).min(self.height());
        let band = imageops::crop_imm(&self.pixels, 0, top, self.width(), self.height() - top);
        Raster::from_rgb(band.to_image())
    }
}

impl From<RgbImage> for Raster {
    fn from(pixels: RgbImage) -> Self {
        Self::from_rgb(pixels)
    }
}

// ============================================================
// DECODER
// ============================================================

/// Decoder settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageDecoder {
    pub min_payload_bytes: usize,
}

impl Default for ImageDecoder {
    fn default() -> Self {
        Self {
            min_payload_bytes: MIN_PAYLOAD_BYTES,
        }
    }
}

impl ImageDecoder {
    /// Decode raw bytes, base64 text, or a data URI into a [`Raster`]
    pub fn decode(&self, input: &[u8]) -> Result<Raster, DecodeError> {
        let payload = self.payload(input)?;
        if payload.len() < self.min_payload_bytes {
            return Err(DecodeError::TooSmall {
                len: payload.len(),
                min: self.min_payload_bytes,
            });
        }

        let image = decode_container(&payload)?;
        let raster = Raster::from_rgb(image.to_rgb8());
        debug!(
            bytes = payload.len(),
            width = raster.width(),
            height = raster.height(),
            "decoded chart image"
        );
        Ok(raster)
    }

    /// Container bytes after stripping any data-URI scheme and base64 layer
    pub fn payload(&self, input: &[u8]) -> Result<Vec<u8>, DecodeError> {
        let (body, from_uri) = strip_data_uri(input)?;
        let body = body.trim_ascii();

        if !from_uri && image::guess_format(body).is_ok() {
            return Ok(body.to_vec());
        }

        let text: Vec<u8> = body.iter().copied().filter(|b| !b.is_ascii_whitespace()).collect();
        Ok(PAYLOAD_ENGINE.decode(text)?)
    }
}

fn strip_data_uri(input: &[u8]) -> Result<(&[u8], bool), DecodeError> {
    let trimmed = input.trim_ascii_start();
    if !trimmed.starts_with(DATA_URI_SCHEME) {
        return Ok((input, false));
    }
    let comma = trimmed
        .iter()
        .position(|&b| b == b',')
        .ok_or(DecodeError::InvalidDataUri)?;
    Ok((&trimmed[comma + 1..], true))
}

fn decode_container(bytes: &[u8]) -> Result<DynamicImage, DecodeError> {
    let primary = match image::load_from_memory(bytes) {
        Ok(image) => return Ok(image),
        Err(err) => err,
    };
    warn!(error = %primary, bytes = bytes.len(), "primary decode failed, trying explicit codecs");

    for format in FALLBACK_FORMATS {
        let mut reader = ImageReader::with_format(Cursor::new(bytes), format);
        reader.no_limits();
        if let Ok(image) = reader.decode() {
            debug!(?format, "fallback codec decoded image");
            return Ok(image);
        }
    }

    Err(DecodeError::Image(primary))
}

// ============================================================
// TESTS
// ============================================================
