use crate::error::{RectifyError, RectifyResult};
use crate::geometry::PixelPos;
use image::DynamicImage;
use std::path::Path;

/// Immutable raw sensor frame, row-major, `channels` samples per pixel.
#[derive(Debug, Clone)]
pub struct Frame {
    width: usize,
    height: usize,
    channels: usize,
    data: Vec<f32>,
}

impl Frame {
    pub fn new(width: usize, height: usize, channels: usize, data: Vec<f32>) -> RectifyResult<Self> {
        if width == 0 || height == 0 || channels == 0 {
            return Err(RectifyError::InvalidFrame(format!(
                "dimensions must be positive (got {}x{}x{})",
                width, height, channels
            )));
        }
        if data.len() != width * height * channels {
            return Err(RectifyError::InvalidFrame(format!(
                "expected {} samples for {}x{}x{}, got {}",
                width * height * channels,
                width,
                height,
                channels,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    pub fn from_gray(width: usize, height: usize, data: Vec<f32>) -> RectifyResult<Self> {
        Self::new(width, height, 1, data)
    }

    /// Decodes a raster file. Gray images keep one channel, color images keep RGB.
    pub fn load<P: AsRef<Path>>(path: P) -> RectifyResult<Self> {
        let img = image::open(path.as_ref())?;
        Self::from_dynamic(img)
    }

    pub fn from_dynamic(img: DynamicImage) -> RectifyResult<Self> {
        let width = img.width() as usize;
        let height = img.height() as usize;
        if img.color().has_color() {
            let data = img.into_rgb16().into_raw().into_iter().map(f32::from).collect();
            Self::new(width, height, 3, data)
        } else {
            let data = img.into_luma16().into_raw().into_iter().map(f32::from).collect();
            Self::new(width, height, 1, data)
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn contains(&self, p: PixelPos) -> bool {
        p.row >= 0 && p.col >= 0 && (p.row as usize) < self.height && (p.col as usize) < self.width
    }

    /// Brightness of an in-bounds pixel: the sum of its channels.
    #[inline]
    pub fn brightness(&self, row: usize, col: usize) -> f64 {
        let start = (row * self.width + col) * self.channels;
        self.data[start..start + self.channels]
            .iter()
            .map(|&v| v as f64)
            .sum()
    }

    /// Brightness at a possibly out-of-frame position.
    #[inline]
    pub fn brightness_at(&self, p: PixelPos) -> Option<f64> {
        if self.contains(p) {
            Some(self.brightness(p.row as usize, p.col as usize))
        } else {
            None
        }
    }
}
