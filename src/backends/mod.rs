// SPDX-License-Identifier: GPL-3.0-only

//! Backend layer: frame types in, virtual camera device out
//!
//! ```text
//! ┌──────────────────┐      ┌──────────────────────────┐
//! │ camera::types    │ ───► │ virtual_camera           │
//! │ CameraFrame      │      │ renderer → sink → device │
//! └──────────────────┘      └──────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`camera`]: Source frame and resolution types
//! - [`virtual_camera`]: Filter renderer, device sink and the pipeline tying them together

pub mod camera;
pub mod virtual_camera;
