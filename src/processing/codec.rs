//! Decode, resize and encode primitives behind the [`ImageCodec`] trait
//!
//! The conversion pipeline only ever talks to the trait, so the `image`-crate
//! backed [`JpegCodec`] can be swapped for a fake in tests.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage};

use crate::error::{BatchScaleError, Result};

/// JPEG quality used for every output file
pub const OUTPUT_QUALITY: u8 = 100;

/// Resampling filter used for every resize
pub const RESIZE_FILTER: FilterType = FilterType::Lanczos3;

/// A decoded bitmap owned by exactly one conversion.
#[derive(Debug, Clone)]
pub struct RasterImage {
    image: DynamicImage,
}

impl RasterImage {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Raw pixel bytes in the decoded color layout
    pub fn pixels(&self) -> &[u8] {
        self.image.as_bytes()
    }

    pub fn into_inner(self) -> DynamicImage {
        self.image
    }
}

impl From<DynamicImage> for RasterImage {
    fn from(image: DynamicImage) -> Self {
        Self::new(image)
    }
}

/// Image primitives used by a conversion.
///
/// Implementations are called from worker threads and must be thread-safe.
pub trait ImageCodec: Send + Sync + 'static {
    /// Decode encoded bytes into a raster
    fn decode(&self, bytes: &[u8]) -> Result<RasterImage>;

    /// Resize a raster to exactly `width` x `height`
    fn resize(&self, raster: RasterImage, width: u32, height: u32) -> Result<RasterImage>;

    /// Encode a raster into the output file format
    fn encode(&self, raster: &RasterImage) -> Result<Vec<u8>>;
}

/// Production codec: `image` decoders, Lanczos3 resampling, JPEG at quality 100.
#[derive(Debug, Clone, Copy)]
pub struct JpegCodec {
    quality: u8,
}

impl JpegCodec {
    pub fn new() -> Self {
        Self {
            quality: OUTPUT_QUALITY,
        }
    }
}

impl Default for JpegCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageCodec for JpegCodec {
    fn decode(&self, bytes: &[u8]) -> Result<RasterImage> {
        image::load_from_memory(bytes)
            .map(RasterImage::new)
            .map_err(|e| BatchScaleError::decode(e.to_string(), None))
    }

    fn resize(&self, raster: RasterImage, width: u32, height: u32) -> Result<RasterImage> {
        if width == 0 || height == 0 {
            return Err(BatchScaleError::invalid_parameters(format!(
                "Cannot resize to {}x{}", width, height
            )));
        }
        if raster.width() == width && raster.height() == height {
            return Ok(raster);
        }

        let resized = raster.image.resize_exact(width, height, RESIZE_FILTER);
        Ok(RasterImage::new(resized))
    }

    fn encode(&self, raster: &RasterImage) -> Result<Vec<u8>> {
        // JPEG has no alpha channel
        let rgb = raster.image.to_rgb8();
        let mut bytes = Vec::new();

        JpegEncoder::new_with_quality(&mut bytes, self.quality)
            .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
            .map_err(|e| BatchScaleError::system(format!("JPEG encoding failed: {}", e)))?;

        Ok(bytes)
    }
}
