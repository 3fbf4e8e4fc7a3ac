// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Frame rate limits for the streaming loop
pub mod timing {
    use super::Duration;

    /// Default refresh rate of the render tick
    pub const DEFAULT_FRAME_RATE: u32 = 30;

    /// Upper bound accepted from config and CLI
    pub const MAX_FRAME_RATE: u32 = 120;

    /// Frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 30;

    /// Tick period for a frame rate, clamped to [1, MAX_FRAME_RATE]
    pub fn frame_interval(frame_rate: u32) -> Duration {
        let fps = frame_rate.clamp(1, MAX_FRAME_RATE);
        Duration::from_micros(1_000_000 / fps as u64)
    }
}

/// Supported file formats for the image frame source
pub mod file_formats {
    /// Supported image file extensions
    pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

    /// Check if a file extension is a supported image format
    pub fn is_image_extension(ext: &str) -> bool {
        IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str())
    }
}

/// Virtual camera device defaults
pub mod virtual_camera {
    /// Device node used when none (or a blank path) is configured
    pub const DEFAULT_DEVICE_PATH: &str = "/dev/video42";

    /// Size of the headless preview surface
    pub const PREVIEW_WIDTH: u32 = 640;
    pub const PREVIEW_HEIGHT: u32 = 360;

    /// Test pattern size when no image is given
    pub const TEST_PATTERN_WIDTH: u32 = 1280;
    pub const TEST_PATTERN_HEIGHT: u32 = 720;
}

/// Application information utilities
pub mod app_info {
    /// Application name, also the config directory name
    pub const APP_NAME: &str = "filtercam";

    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}
