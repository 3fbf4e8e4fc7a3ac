// SPDX-License-Identifier: GPL-3.0-only

//! filtercam - GPU color filters streamed into a v4l2loopback virtual camera
//!
//! Frames from a source are run through a color filter, captured off-screen,
//! converted to packed YUYV and written to a kernel video-output device, where
//! conferencing and streaming tools pick them up as a regular webcam.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Frame types and the virtual camera (renderer, sink, pipeline)
//! - [`media`]: RGB to YUYV conversion and resolution fitting
//! - [`shaders`]: WGSL filter shader and its uniform layout
//! - [`gpu`]: GPU device creation and context epochs
//! - [`config`]: User configuration handling
//! - [`diagnostics`]: Error reporting channel
//!
//! # Example
//!
//! ```ignore
//! // Stream a test pattern through the sepia filter:
//! // filtercam stream --filter sepia --device /dev/video42
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod diagnostics;
pub mod errors;
pub mod gpu;
pub mod media;
pub mod shaders;

// Re-export commonly used types
pub use backends::camera::types::{CameraFrame, PixelFormat, Resolution};
pub use backends::virtual_camera::{FilterSelection, FilterType, VirtualCameraPipeline};
pub use config::Config;
pub use diagnostics::Diagnostics;
pub use errors::{VcamError, VcamResult};
