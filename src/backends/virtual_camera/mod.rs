// SPDX-License-Identifier: GPL-3.0-only

//! Virtual camera backend for streaming filtered video to v4l2loopback
//!
//! Frames from any source are filtered on the GPU (or on the CPU when no
//! adapter is available) and written to a kernel video-output node that
//! other applications (like video conferencing software) open as a camera.
//!
//! # Architecture
//!
//! ```text
//! Frame source ──publish──► LatestFrame (last writer wins)
//!                                │ tick
//!                                ▼
//!                     ┌──────────────────────┐
//!                     │ GPU filter renderer  │ ──► preview surface (letterboxed)
//!                     │ (or CPU fallback)    │
//!                     └──────────────────────┘
//!                                │ captured RGB
//!                                ▼
//!                     ┌──────────────────────┐
//!                     │ Sink: fit, RGB→YUYV, │ ──► /dev/videoN
//!                     │ S_FMT, write         │
//!                     └──────────────────────┘
//! ```
//!
//! Device and resource failures go to the [`Diagnostics`](crate::diagnostics::Diagnostics)
//! channel instead of being returned to the frame producer.

mod file_source;
pub mod filters;
mod gpu_filter;
mod pipeline;
pub mod v4l2_output;
mod v4l2_sink;

pub use file_source::{load_image_as_frame, test_pattern};
pub use filters::{FilterSelection, FilterType, apply_filter_cpu};
pub use gpu_filter::{GpuFilterRenderer, PreviewSurface, RenderSurface, aspect_scale};
pub use pipeline::{FilterBackend, VirtualCameraPipeline};
pub use v4l2_output::{
    DeviceCapabilities, DeviceOpener, OutputDevice, OutputFormat, V4l2Opener, V4l2OutputDevice,
    find_loopback_devices, query_capabilities,
};
pub use v4l2_sink::{SinkState, VirtualCameraSink, normalize_device_path};

use crate::backends::camera::types::CameraFrame;
use std::sync::{Arc, Mutex};

/// Single-slot frame mailbox shared between a producer and the pipeline
///
/// Publishing replaces whatever frame has not been consumed yet, so the
/// pipeline only ever sees the most recent one.
#[derive(Debug, Clone, Default)]
pub struct LatestFrame {
    slot: Arc<Mutex<Option<CameraFrame>>>,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a frame, dropping any unconsumed one
    pub fn publish(&self, frame: CameraFrame) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(frame);
        }
    }

    /// Take the pending frame, if any
    pub fn take(&self) -> Option<CameraFrame> {
        self.slot.lock().ok().and_then(|mut slot| slot.take())
    }

    pub fn has_pending(&self) -> bool {
        self.slot.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::PixelFormat;

    fn frame(width: u32) -> CameraFrame {
        CameraFrame::new(width, 1, PixelFormat::Gray8, vec![0u8; width as usize])
    }

    #[test]
    fn test_latest_frame_last_writer_wins() {
        let cell = LatestFrame::new();
        let producer = cell.clone();
        producer.publish(frame(1));
        producer.publish(frame(2));
        producer.publish(frame(3));

        assert!(cell.has_pending());
        assert_eq!(cell.take().map(|f| f.width), Some(3));
        assert!(cell.take().is_none());
        assert!(!cell.has_pending());
    }
}
