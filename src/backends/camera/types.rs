// SPDX-License-Identifier: GPL-3.0-only

//! Frame types handed from a frame source to the virtual camera pipeline

use crate::errors::{VcamError, VcamResult};
use image::{RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Pixel layout of a source frame
///
/// Every variant has an explicit, total conversion to RGBA in
/// [`CameraFrame::to_rgba`]. Layouts not listed here are rejected at the
/// input boundary instead of being guessed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// R G B A, 4 bytes per pixel
    RGBA,
    /// B G R A, 4 bytes per pixel (common from desktop capture)
    BGRA,
    /// R G B, 3 bytes per pixel
    RGB24,
    /// B G R, 3 bytes per pixel
    BGR24,
    /// Single 8-bit luma channel, replicated to R, G and B
    Gray8,
}

impl PixelFormat {
    /// Bytes used by one pixel in a row
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            Self::RGBA | Self::BGRA => 4,
            Self::RGB24 | Self::BGR24 => 3,
            Self::Gray8 => 1,
        }
    }

    /// Expand one source pixel to RGBA
    #[inline]
    fn to_rgba_pixel(self, px: &[u8]) -> [u8; 4] {
        match self {
            Self::RGBA => [px[0], px[1], px[2], px[3]],
            Self::BGRA => [px[2], px[1], px[0], px[3]],
            Self::RGB24 => [px[0], px[1], px[2], 255],
            Self::BGR24 => [px[2], px[1], px[0], 255],
            Self::Gray8 => [px[0], px[0], px[0], 255],
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::RGBA => "RGBA",
            Self::BGRA => "BGRA",
            Self::RGB24 => "RGB24",
            Self::BGR24 => "BGR24",
            Self::Gray8 => "GRAY8",
        };
        write!(f, "{}", name)
    }
}

/// Output geometry (width x height)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Both dimensions are non-zero
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl std::str::FromStr for Resolution {
    type Err = String;

    /// Parse "1280x720" (an uppercase `X` is accepted too)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
        let width = w
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid width '{}': {}", w, e))?;
        let height = h
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid height '{}': {}", h, e))?;
        let resolution = Resolution::new(width, height);
        if !resolution.is_valid() {
            return Err(format!("resolution must be non-zero, got '{}'", s));
        }
        Ok(resolution)
    }
}

/// A single frame as delivered by a frame source
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    /// Row stride in bytes (>= width * bytes_per_pixel)
    pub stride: u32,
    pub format: PixelFormat,
    pub data: Arc<[u8]>,
}

impl CameraFrame {
    /// Wrap a tightly packed buffer
    pub fn new(width: u32, height: u32, format: PixelFormat, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            width,
            height,
            stride: width * format.bytes_per_pixel(),
            format,
            data: data.into(),
        }
    }

    pub fn from_rgba_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(width, height, PixelFormat::RGBA, image.into_raw())
    }

    pub fn from_rgb_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(width, height, PixelFormat::RGB24, image.into_raw())
    }

    /// Check geometry, stride and buffer length against the pixel format
    pub fn validate(&self) -> VcamResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(VcamError::InvalidFrame(format!(
                "non-positive geometry {}x{}",
                self.width, self.height
            )));
        }

        let row_bytes = self.width as usize * self.format.bytes_per_pixel() as usize;
        let stride = self.stride as usize;
        if stride < row_bytes {
            return Err(VcamError::InvalidFrame(format!(
                "stride {} smaller than row size {} for {}",
                stride, row_bytes, self.format
            )));
        }

        // Last row only needs its visible bytes
        let required = stride * (self.height as usize - 1) + row_bytes;
        if self.data.len() < required {
            return Err(VcamError::InvalidFrame(format!(
                "buffer holds {} bytes, {}x{} {} needs {}",
                self.data.len(),
                self.width,
                self.height,
                self.format,
                required
            )));
        }

        Ok(())
    }

    /// Normalize to a tightly packed RGBA image
    pub fn to_rgba(&self) -> VcamResult<RgbaImage> {
        self.validate()?;

        let width = self.width as usize;
        let bpp = self.format.bytes_per_pixel() as usize;
        let stride = self.stride as usize;
        let mut rgba = Vec::with_capacity(width * self.height as usize * 4);

        for row in self.data.chunks(stride).take(self.height as usize) {
            for px in row[..width * bpp].chunks_exact(bpp) {
                rgba.extend_from_slice(&self.format.to_rgba_pixel(px));
            }
        }

        RgbaImage::from_raw(self.width, self.height, rgba)
            .ok_or_else(|| VcamError::InvalidFrame("RGBA buffer size mismatch".into()))
    }

    /// Normalize to a tightly packed RGB image (alpha dropped)
    pub fn to_rgb(&self) -> VcamResult<RgbImage> {
        let rgba = self.to_rgba()?;
        Ok(image::DynamicImage::ImageRgba8(rgba).to_rgb8())
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}
