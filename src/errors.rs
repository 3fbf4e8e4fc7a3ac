// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the virtual camera pipeline

use std::fmt;

/// Result type alias using VcamError
pub type VcamResult<T> = Result<T, VcamError>;

/// Errors raised by the renderer, converter and device sink
///
/// Device and resource errors are also forwarded to the diagnostics channel,
/// so their `Display` text is meant to be shown to the user as-is.
#[derive(Debug, Clone, PartialEq)]
pub enum VcamError {
    /// The output device could not be opened
    DeviceOpen { path: String, reason: String },
    /// VIDIOC_S_FMT was rejected by the driver
    FormatNegotiation(String),
    /// The kernel accepted fewer bytes than the frame holds
    ShortWrite {
        written: usize,
        expected: usize,
        reason: String,
    },
    /// The write syscall failed outright
    Write(String),
    /// RGB to YUYV conversion was handed an unusable frame
    Conversion(String),
    /// WGSL shader module or render pipeline failed validation
    ShaderCompilation(String),
    /// Off-screen render target could not be created
    RenderTarget(String),
    /// No usable GPU adapter/device
    GpuInit(String),
    /// Mapping the readback buffer failed
    Readback(String),
    /// Frame rejected at the input boundary
    InvalidFrame(String),
    /// Configuration could not be read or written
    Config(String),
    /// Generic I/O error
    Io(String),
}

impl fmt::Display for VcamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VcamError::DeviceOpen { path, reason } => {
                write!(f, "Cannot open virtual camera device {}: {}", path, reason)
            }
            VcamError::FormatNegotiation(msg) => {
                write!(f, "Failed to configure virtual camera format: {}", msg)
            }
            VcamError::ShortWrite {
                written,
                expected,
                reason,
            } => write!(
                f,
                "Failed to write frame to virtual camera: wrote {} of {} bytes ({})",
                written, expected, reason
            ),
            VcamError::Write(msg) => write!(f, "Failed to write frame to virtual camera: {}", msg),
            VcamError::Conversion(msg) => {
                write!(f, "Failed to convert frame for virtual camera output: {}", msg)
            }
            VcamError::ShaderCompilation(msg) => write!(f, "Failed to build filter shader: {}", msg),
            VcamError::RenderTarget(msg) => {
                write!(f, "Failed to create off-screen render target: {}", msg)
            }
            VcamError::GpuInit(msg) => write!(f, "GPU initialization failed: {}", msg),
            VcamError::Readback(msg) => write!(f, "Failed to read back filtered frame: {}", msg),
            VcamError::InvalidFrame(msg) => write!(f, "Invalid frame: {}", msg),
            VcamError::Config(msg) => write!(f, "Configuration error: {}", msg),
            VcamError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for VcamError {}

impl From<std::io::Error> for VcamError {
    fn from(err: std::io::Error) -> Self {
        VcamError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for VcamError {
    fn from(err: serde_json::Error) -> Self {
        VcamError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_open_message_names_path() {
        let err = VcamError::DeviceOpen {
            path: "/dev/video42".into(),
            reason: "No such file or directory".into(),
        };
        let text = err.to_string();
        assert!(text.contains("/dev/video42"));
        assert!(text.contains("No such file or directory"));
    }

    #[test]
    fn test_short_write_message_has_counts() {
        let err = VcamError::ShortWrite {
            written: 100,
            expected: 200,
            reason: "Resource temporarily unavailable".into(),
        };
        assert!(err.to_string().contains("100 of 200"));
    }
}
