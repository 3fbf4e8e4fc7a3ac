// SPDX-License-Identifier: GPL-3.0-only

//! Fitting rendered frames to a forced output resolution
//!
//! Conferencing apps dislike format changes mid-call, so the sink can pin its
//! output geometry. Frames are scaled up until they cover the target (aspect
//! preserved), center-cropped, and only as a last resort stretched.

use crate::backends::camera::types::Resolution;
use image::RgbImage;
use image::imageops::{self, FilterType};
use tracing::debug;

/// Size that covers `target` while keeping the aspect ratio of `source`
///
/// Mirrors "keep aspect ratio by expanding": try matching the target height,
/// and if the resulting width falls short, match the width instead.
pub fn expanded_size(source: Resolution, target: Resolution) -> Resolution {
    if !source.is_valid() {
        return target;
    }

    let (sw, sh) = (source.width as u64, source.height as u64);
    let (tw, th) = (target.width as u64, target.height as u64);

    let width_at_target_height = th * sw / sh;
    if width_at_target_height >= tw {
        Resolution::new(width_at_target_height as u32, target.height)
    } else {
        Resolution::new(target.width, (tw * sh / sw) as u32)
    }
}

/// Scale and crop `image` to exactly `target`
///
/// Returns the input untouched when it already matches.
pub fn fit_to_resolution(image: RgbImage, target: Resolution) -> RgbImage {
    let source = Resolution::new(image.width(), image.height());
    if source == target || !target.is_valid() {
        return image;
    }

    let expanded = expanded_size(source, target);
    let mut fitted = if expanded == source {
        image
    } else {
        imageops::resize(&image, expanded.width, expanded.height, FilterType::Triangle)
    };

    if fitted.dimensions() != (target.width, target.height)
        && fitted.width() >= target.width
        && fitted.height() >= target.height
    {
        let x = (fitted.width() - target.width) / 2;
        let y = (fitted.height() - target.height) / 2;
        fitted = imageops::crop_imm(&fitted, x, y, target.width, target.height).to_image();
    }

    if fitted.dimensions() != (target.width, target.height) {
        debug!(
            from = %source,
            to = %target,
            "Aspect-preserving fit missed target, stretching"
        );
        fitted = imageops::resize(&fitted, target.width, target.height, FilterType::Triangle);
    }

    fitted
}
