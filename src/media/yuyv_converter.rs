// SPDX-License-Identifier: GPL-3.0-only

//! RGB24 to packed YUYV (YUY2) conversion for the virtual camera device
//!
//! Output is 4:2:2: every horizontal pixel pair becomes one macropixel
//! `Y0 U Y1 V`, where U/V are the average of the two pixels' chroma. An odd
//! trailing pixel gets its own unaveraged chroma (`Y U Y V`).

use crate::errors::{VcamError, VcamResult};
use image::RgbImage;

/// Bytes per pixel in the packed 4:2:2 output
pub const YUYV_BYTES_PER_PIXEL: usize = 2;

/// Y, U and V of a single pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Yuv {
    pub y: u8,
    pub u: u8,
    pub v: u8,
}

#[inline]
fn clamp_to_byte(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// BT.601 studio-swing conversion with integer math
#[inline]
pub fn rgb_to_yuv(r: u8, g: u8, b: u8) -> Yuv {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let y = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
    let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
    let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;

    Yuv {
        y: clamp_to_byte(y),
        u: clamp_to_byte(u),
        v: clamp_to_byte(v),
    }
}

/// Size of a YUYV frame in bytes
pub fn yuyv_frame_size(width: u32, height: u32) -> usize {
    width as usize * height as usize * YUYV_BYTES_PER_PIXEL
}

/// Convert a packed RGB24 image into a freshly allocated YUYV buffer
pub fn convert_rgb_to_yuyv(image: &RgbImage) -> VcamResult<Vec<u8>> {
    let mut output = Vec::new();
    convert_rgb_to_yuyv_into(image, &mut output)?;
    Ok(output)
}

/// Convert into a caller-owned buffer, resizing it to exactly `w * h * 2`
pub fn convert_rgb_to_yuyv_into(image: &RgbImage, output: &mut Vec<u8>) -> VcamResult<()> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(VcamError::Conversion(format!(
            "non-positive geometry {}x{}",
            width, height
        )));
    }

    let width = width as usize;
    let src_stride = width * 3;
    let dst_stride = width * YUYV_BYTES_PER_PIXEL;
    output.clear();
    output.resize(dst_stride * height as usize, 0);

    for (src, dst) in image
        .as_raw()
        .chunks_exact(src_stride)
        .zip(output.chunks_exact_mut(dst_stride))
    {
        convert_row(src, dst);
    }

    Ok(())
}

/// Convert one row; `src` holds exactly `width * 3` bytes
fn convert_row(src: &[u8], dst: &mut [u8]) {
    let mut pairs = src.chunks_exact(6);

    for (pair, out) in (&mut pairs).zip(dst.chunks_exact_mut(4)) {
        let p0 = rgb_to_yuv(pair[0], pair[1], pair[2]);
        let p1 = rgb_to_yuv(pair[3], pair[4], pair[5]);

        out[0] = p0.y;
        out[1] = clamp_to_byte((p0.u as i32 + p1.u as i32) / 2);
        out[2] = p1.y;
        out[3] = clamp_to_byte((p0.v as i32 + p1.v as i32) / 2);
    }

    // Odd width: the last pixel forms its own `Y U Y V` macropixel with
    // unaveraged chroma. Only its first half fits inside the `width * 2`
    // row stride; the trailing `Y V` would land in the next row.
    let tail = pairs.remainder();
    if let [r, g, b] = *tail {
        let p = rgb_to_yuv(r, g, b);
        let macropixel = [p.y, p.u, p.y, p.v];
        let at = dst.len() - YUYV_BYTES_PER_PIXEL;
        dst[at..].copy_from_slice(&macropixel[..YUYV_BYTES_PER_PIXEL]);
    }
}
