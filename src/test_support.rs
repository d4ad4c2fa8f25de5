//! Shared fixtures for unit tests

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use image::{ImageBuffer, Rgb};

use crate::cancel::CancellationSignal;
use crate::error::Result;
use crate::processing::{ImageCodec, JpegCodec, RasterImage};

/// Write a gradient PNG and return its path
pub fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
    });
    img.save_with_format(&path, image::ImageFormat::Png).unwrap();
    path
}

/// Real codec that trips the cancellation signal at a chosen point
pub struct CancelOnDecode {
    inner: JpegCodec,
    signal: CancellationSignal,
    cancel_at_decode: Option<usize>,
    cancel_on_encode: bool,
    decodes: AtomicUsize,
    resizes: AtomicUsize,
}

impl CancelOnDecode {
    /// Cancel during the `nth` decode (1-based)
    pub fn new(signal: CancellationSignal, nth: usize) -> Self {
        Self {
            inner: JpegCodec::new(),
            signal,
            cancel_at_decode: Some(nth),
            cancel_on_encode: false,
            decodes: AtomicUsize::new(0),
            resizes: AtomicUsize::new(0),
        }
    }

    /// Cancel during the first encode, after resize and before write
    pub fn on_encode(signal: CancellationSignal) -> Self {
        Self {
            cancel_at_decode: None,
            cancel_on_encode: true,
            ..Self::new(signal, 0)
        }
    }

    pub fn decodes(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }

    pub fn resizes(&self) -> usize {
        self.resizes.load(Ordering::SeqCst)
    }
}

impl ImageCodec for CancelOnDecode {
    fn decode(&self, bytes: &[u8]) -> Result<RasterImage> {
        let count = self.decodes.fetch_add(1, Ordering::SeqCst) + 1;
        let raster = self.inner.decode(bytes)?;
        if self.cancel_at_decode == Some(count) {
            self.signal.cancel();
        }
        Ok(raster)
    }

    fn resize(&self, raster: RasterImage, width: u32, height: u32) -> Result<RasterImage> {
        self.resizes.fetch_add(1, Ordering::SeqCst);
        self.inner.resize(raster, width, height)
    }

    fn encode(&self, raster: &RasterImage) -> Result<Vec<u8>> {
        let bytes = self.inner.encode(raster)?;
        if self.cancel_on_encode {
            self.signal.cancel();
        }
        Ok(bytes)
    }
}

/// Real codec that records how many conversions overlap
#[derive(Default)]
pub struct OverlapProbe {
    inner: JpegCodec,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl OverlapProbe {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl ImageCodec for OverlapProbe {
    fn decode(&self, bytes: &[u8]) -> Result<RasterImage> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(30));
        self.inner.decode(bytes)
    }

    fn resize(&self, raster: RasterImage, width: u32, height: u32) -> Result<RasterImage> {
        self.inner.resize(raster, width, height)
    }

    fn encode(&self, raster: &RasterImage) -> Result<Vec<u8>> {
        let bytes = self.inner.encode(raster);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        bytes
    }
}
