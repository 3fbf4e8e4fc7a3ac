// SPDX-License-Identifier: GPL-3.0-only

//! Pixel conversion and geometry helpers for the device output path
//!
//! - [`yuyv_converter`]: RGB24 to packed 4:2:2 (YUYV) conversion
//! - [`scaling`]: fitting frames to a forced output resolution

pub mod scaling;
pub mod yuyv_converter;

pub use scaling::{expanded_size, fit_to_resolution};
pub use yuyv_converter::{convert_rgb_to_yuyv, convert_rgb_to_yuyv_into, rgb_to_yuv, yuyv_frame_size};
