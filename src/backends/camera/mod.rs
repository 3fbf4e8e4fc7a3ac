// SPDX-License-Identifier: GPL-3.0-only

//! Camera-side types shared by every frame source
//!
//! Capture itself (device enumeration, controls) lives outside this crate;
//! sources hand over [`CameraFrame`]s and the virtual camera takes it from there.

pub mod types;

pub use types::*;
