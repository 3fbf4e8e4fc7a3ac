// SPDX-License-Identifier: GPL-3.0-only

//! Still-image frame sources for the virtual camera
//!
//! Streams an image file (or a generated color-bar pattern) as if it came
//! from a camera, so the full pipeline can run without capture hardware.

use crate::backends::camera::types::CameraFrame;
use crate::constants::file_formats;
use crate::errors::{VcamError, VcamResult};
use image::RgbaImage;
use std::path::Path;
use tracing::info;

/// SMPTE-style bars: white, yellow, cyan, green, magenta, red, blue, black
const COLOR_BARS: [[u8; 3]; 8] = [
    [235, 235, 235],
    [235, 235, 16],
    [16, 235, 235],
    [16, 235, 16],
    [235, 16, 235],
    [235, 16, 16],
    [16, 16, 235],
    [16, 16, 16],
];

/// Load an image file and convert it to a CameraFrame
///
/// Supports common image formats: PNG, JPEG, GIF, BMP, WebP
pub fn load_image_as_frame(path: &Path) -> VcamResult<CameraFrame> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    if !file_formats::is_image_extension(&extension) {
        return Err(VcamError::InvalidFrame(format!(
            "unsupported image type '{}' ({})",
            extension,
            path.display()
        )));
    }

    info!(path = %path.display(), "Loading image file");

    let img = image::open(path).map_err(|e| {
        VcamError::Io(format!("Failed to load image '{}': {}", path.display(), e))
    })?;

    let rgba = img.to_rgba8();
    info!(width = rgba.width(), height = rgba.height(), "Image loaded successfully");

    let frame = CameraFrame::from_rgba_image(rgba);
    frame.validate()?;
    Ok(frame)
}

/// Vertical color bars with a luma ramp along the bottom eighth
pub fn test_pattern(width: u32, height: u32) -> CameraFrame {
    let width = width.max(1);
    let height = height.max(1);
    let ramp_start = height - height / 8;

    let image = RgbaImage::from_fn(width, height, |x, y| {
        if y >= ramp_start {
            let v = (x as u64 * 255 / (width as u64 - 1).max(1)).min(255) as u8;
            return image::Rgba([v, v, v, 255]);
        }
        let bar = (x as u64 * COLOR_BARS.len() as u64 / width as u64) as usize;
        let [r, g, b] = COLOR_BARS[bar.min(COLOR_BARS.len() - 1)];
        image::Rgba([r, g, b, 255])
    });

    CameraFrame::from_rgba_image(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::PixelFormat;

    #[test]
    fn test_pattern_geometry() {
        let frame = test_pattern(64, 32);
        assert_eq!((frame.width, frame.height), (64, 32));
        assert_eq!(frame.format, PixelFormat::RGBA);
        assert!(frame.validate().is_ok());
    }

    #[test]
    fn test_pattern_bars() {
        let rgba = test_pattern(80, 80).to_rgba().unwrap();
        // First bar white, last bar black
        assert_eq!(rgba.get_pixel(0, 0).0, [235, 235, 235, 255]);
        assert_eq!(rgba.get_pixel(79, 0).0, [16, 16, 16, 255]);
    }

    #[test]
    fn test_degenerate_pattern_size() {
        let frame = test_pattern(0, 0);
        assert_eq!((frame.width, frame.height), (1, 1));
    }

    #[test]
    fn test_rejects_unknown_extension() {
        let result = load_image_as_frame(Path::new("/tmp/not-an-image.txt"));
        assert!(matches!(result, Err(VcamError::InvalidFrame(_))));
    }

    #[test]
    fn test_missing_image_fails() {
        let result = load_image_as_frame(Path::new("/nonexistent/frame.png"));
        assert!(matches!(result, Err(VcamError::Io(_))));
    }

    #[test]
    fn test_round_trip_through_png() {
        let path = std::env::temp_dir().join(format!("filtercam-test-{}.png", std::process::id()));
        let image = RgbaImage::from_pixel(5, 3, image::Rgba([10, 20, 30, 255]));
        image.save(&path).unwrap();

        let frame = load_image_as_frame(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!((frame.width, frame.height), (5, 3));
        assert_eq!(frame.to_rgba().unwrap().get_pixel(4, 2).0, [10, 20, 30, 255]);
    }
}
