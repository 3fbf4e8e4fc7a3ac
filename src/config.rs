// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::camera::types::Resolution;
use crate::backends::virtual_camera::{FilterSelection, FilterType, normalize_device_path};
use crate::constants::{app_info, timing, virtual_camera};
use crate::errors::{VcamError, VcamResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Persistent settings of the virtual camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// v4l2loopback node frames are written to
    pub device_path: String,
    /// Whether frames are written to the device at all
    pub enabled: bool,
    /// Pin the output geometry (scale + center-crop to fit)
    pub forced_resolution: Option<Resolution>,
    /// Selected color filter
    pub filter: FilterType,
    /// Blend between original (0.0) and filtered (1.0)
    pub filter_strength: f32,
    /// Render ticks per second
    pub frame_rate: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_path: virtual_camera::DEFAULT_DEVICE_PATH.to_string(),
            enabled: true,
            forced_resolution: None,
            filter: FilterType::default(),
            filter_strength: 1.0,
            frame_rate: timing::DEFAULT_FRAME_RATE,
        }
    }
}

impl Config {
    /// Default location: `<config dir>/filtercam/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(app_info::APP_NAME).join("config.json"))
    }

    /// Load from the default location, falling back to defaults when absent
    pub fn load() -> VcamResult<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load and normalize a config file
    pub fn load_from(path: &Path) -> VcamResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            VcamError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&text)?;
        info!(path = %path.display(), "Loaded config");
        Ok(config.normalized())
    }

    /// Write as pretty JSON, creating parent directories
    pub fn save_to(&self, path: &Path) -> VcamResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        debug!(path = %path.display(), "Saved config");
        Ok(())
    }

    /// Clamp and clean values that may come from hand-edited files
    pub fn normalized(mut self) -> Self {
        self.device_path = normalize_device_path(&self.device_path);
        self.filter_strength = FilterSelection::new(self.filter, self.filter_strength).strength;
        self.forced_resolution = self.forced_resolution.filter(Resolution::is_valid);
        self.frame_rate = self.frame_rate.clamp(1, timing::MAX_FRAME_RATE);
        self
    }

    pub fn filter_selection(&self) -> FilterSelection {
        FilterSelection::new(self.filter, self.filter_strength)
    }
}
