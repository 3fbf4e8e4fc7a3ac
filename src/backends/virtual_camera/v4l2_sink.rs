// SPDX-License-Identifier: GPL-3.0-only

//! Virtual camera device sink
//!
//! Takes filtered RGB frames, fits them to the optional forced resolution,
//! converts to YUYV and writes them to a v4l2loopback node.
//!
//! The device session follows a small state machine:
//!
//! ```text
//! Closed --open--> Unconfigured --S_FMT(W,H)--> Configured(W,H)
//!    ^                                               |
//!    +---- disable / path change / forced size / ----+
//!          geometry change / any device error
//! ```
//!
//! A geometry change always goes through a full close, reopen and
//! renegotiation before the next write. Any device error closes the node,
//! disables the sink and is reported on the diagnostics channel; the sink
//! stays off until it is explicitly re-enabled.

use super::v4l2_output::{DeviceOpener, OutputDevice, OutputFormat, V4l2Opener};
use crate::backends::camera::types::Resolution;
use crate::constants::virtual_camera::DEFAULT_DEVICE_PATH;
use crate::diagnostics::Diagnostics;
use crate::errors::{VcamError, VcamResult};
use crate::media::{convert_rgb_to_yuyv_into, fit_to_resolution};
use image::RgbImage;
use tracing::{debug, info};

/// Observable state of the device session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Closed,
    /// Handle open, no format negotiated yet
    ///
    /// Transient: open and negotiation happen within one
    /// [`VirtualCameraSink::on_processed_frame`] call and a failed
    /// negotiation closes the handle, so between calls the sink is always
    /// `Closed` or `Configured`.
    Unconfigured,
    /// Handle open and negotiated for exactly this geometry
    Configured(Resolution),
}

/// Normalize a user-supplied device path; blank falls back to the default node
pub fn normalize_device_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        DEFAULT_DEVICE_PATH.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Writes processed frames into a kernel video-output device
pub struct VirtualCameraSink<O: DeviceOpener = V4l2Opener> {
    opener: O,
    device_path: String,
    enabled: bool,
    forced_resolution: Option<Resolution>,
    device: Option<Box<dyn OutputDevice>>,
    configured: Option<OutputFormat>,
    /// Reused YUYV scratch buffer
    buffer: Vec<u8>,
    frames_written: u64,
    diagnostics: Diagnostics,
}

impl VirtualCameraSink<V4l2Opener> {
    /// Sink backed by real V4L2 nodes, disabled and pointing at the default path
    pub fn new(diagnostics: Diagnostics) -> Self {
        Self::with_opener(V4l2Opener, diagnostics)
    }
}

impl<O: DeviceOpener> VirtualCameraSink<O> {
    pub fn with_opener(opener: O, diagnostics: Diagnostics) -> Self {
        Self {
            opener,
            device_path: DEFAULT_DEVICE_PATH.to_string(),
            enabled: false,
            forced_resolution: None,
            device: None,
            configured: None,
            buffer: Vec::new(),
            frames_written: 0,
            diagnostics,
        }
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn forced_resolution(&self) -> Option<Resolution> {
        self.forced_resolution
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn state(&self) -> SinkState {
        match (&self.device, self.configured) {
            (None, _) => SinkState::Closed,
            (Some(_), None) => SinkState::Unconfigured,
            (Some(_), Some(format)) => {
                SinkState::Configured(Resolution::new(format.width, format.height))
            }
        }
    }

    /// Point the sink at another device node; an actual change closes the current one
    pub fn set_device_path(&mut self, path: &str) {
        let path = normalize_device_path(path);
        if path == self.device_path {
            return;
        }

        info!(old = %self.device_path, new = %path, "Virtual camera device path changed");
        self.device_path = path;
        self.close();
    }

    /// Disabling releases the device before returning
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled == self.enabled {
            return;
        }

        self.enabled = enabled;
        info!(enabled, "Virtual camera sink toggled");
        if !enabled {
            self.close();
        }
    }

    /// Pin the output geometry; `None` or a zero-sized resolution clears it
    pub fn set_forced_resolution(&mut self, resolution: Option<Resolution>) {
        let resolution = resolution.filter(Resolution::is_valid);
        if resolution == self.forced_resolution {
            return;
        }

        debug!(?resolution, "Virtual camera forced resolution changed");
        self.forced_resolution = resolution;
        self.close();
    }

    /// Push one processed frame to the device
    ///
    /// Returns true if the whole frame was written. Frames are dropped
    /// silently while disabled or when empty.
    pub fn on_processed_frame(&mut self, image: RgbImage) -> bool {
        if !self.enabled || image.width() == 0 || image.height() == 0 {
            return false;
        }

        let image = match self.forced_resolution {
            Some(target) => fit_to_resolution(image, target),
            None => image,
        };

        if convert_rgb_to_yuyv_into(&image, &mut self.buffer).is_err() {
            return false;
        }

        let format = OutputFormat::new(image.width(), image.height());
        let result = self
            .ensure_configured(format)
            .and_then(|()| self.write_buffer());

        match result {
            Ok(()) => {
                self.frames_written += 1;
                true
            }
            Err(error) => {
                self.fail(error);
                false
            }
        }
    }

    /// Release the device handle; the sink stays enabled
    pub fn close(&mut self) {
        if self.device.take().is_some() {
            debug!(device_path = %self.device_path, "Closed virtual camera device");
        }
        self.configured = None;
    }

    fn ensure_configured(&mut self, format: OutputFormat) -> VcamResult<()> {
        if self.device.is_some() && self.configured == Some(format) {
            return Ok(());
        }

        if self.device.is_some() {
            debug!(
                width = format.width,
                height = format.height,
                "Frame geometry changed, reopening virtual camera device"
            );
            self.close();
        }

        let device = self
            .opener
            .open(&self.device_path)
            .map_err(|e| VcamError::DeviceOpen {
                path: self.device_path.clone(),
                reason: e.to_string(),
            })?;
        let device = self.device.insert(device);

        device
            .set_format(&format)
            .map_err(|e| VcamError::FormatNegotiation(e.to_string()))?;
        self.configured = Some(format);

        info!(
            device_path = %self.device_path,
            width = format.width,
            height = format.height,
            "Virtual camera device configured for YUYV output"
        );
        Ok(())
    }

    fn write_buffer(&mut self) -> VcamResult<()> {
        let expected = self.buffer.len();
        let device = self
            .device
            .as_mut()
            .ok_or_else(|| VcamError::Write("device is not open".into()))?;

        match device.write_frame(&self.buffer) {
            Ok(written) if written == expected => Ok(()),
            Ok(written) => Err(VcamError::ShortWrite {
                written,
                expected,
                reason: "device accepted a partial frame".into(),
            }),
            Err(e) => Err(VcamError::Write(e.to_string())),
        }
    }

    fn fail(&mut self, error: VcamError) {
        self.close();
        self.enabled = false;
        self.diagnostics.report(error);
    }
}

impl<O: DeviceOpener> Drop for VirtualCameraSink<O> {
    fn drop(&mut self) {
        self.close();
    }
}
