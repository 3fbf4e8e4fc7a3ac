// SPDX-License-Identifier: GPL-3.0-only

//! Color filters for the virtual camera output
//!
//! [`FilterType`] is shared by the GPU renderer (its `code` selects the
//! shader branch) and the CPU path below. The CPU implementation is the
//! fallback when no GPU adapter is available and mirrors the shader math
//! exactly, so both produce the same frame up to 8-bit rounding.

use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// Filter strength values closer than this are treated as equal
pub const STRENGTH_EPSILON: f32 = 1e-4;

/// Available color filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    /// Pass-through
    #[default]
    None,
    Grayscale,
    Sepia,
    Invert,
    /// Slight shift toward red
    Warm,
    /// Slight shift toward blue
    Cool,
}

impl FilterType {
    pub const ALL: [FilterType; 6] = [
        FilterType::None,
        FilterType::Grayscale,
        FilterType::Sepia,
        FilterType::Invert,
        FilterType::Warm,
        FilterType::Cool,
    ];

    /// Selector passed to the shader uniform
    pub fn code(&self) -> u32 {
        match self {
            FilterType::None => 0,
            FilterType::Grayscale => 1,
            FilterType::Sepia => 2,
            FilterType::Invert => 3,
            FilterType::Warm => 4,
            FilterType::Cool => 5,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FilterType::None => "none",
            FilterType::Grayscale => "grayscale",
            FilterType::Sepia => "sepia",
            FilterType::Invert => "invert",
            FilterType::Warm => "warm",
            FilterType::Cool => "cool",
        }
    }
}

impl std::fmt::Display for FilterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for FilterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        FilterType::ALL
            .into_iter()
            .find(|f| f.name() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = FilterType::ALL.iter().map(|f| f.name()).collect();
                format!("unknown filter '{}', expected one of: {}", s, names.join(", "))
            })
    }
}

/// Filter plus blend strength in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterSelection {
    pub filter: FilterType,
    pub strength: f32,
}

impl Default for FilterSelection {
    fn default() -> Self {
        Self {
            filter: FilterType::None,
            strength: 1.0,
        }
    }
}

impl FilterSelection {
    pub fn new(filter: FilterType, strength: f32) -> Self {
        Self {
            filter,
            strength: clamp_strength(strength),
        }
    }

    /// Output equals input for every pixel
    pub fn is_identity(&self) -> bool {
        self.filter == FilterType::None || self.strength <= 0.0
    }
}

/// Clamp into [0, 1]; NaN becomes 0
pub fn clamp_strength(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Pure filter output for one normalized RGB triple, before blending
pub fn filter_target(filter: FilterType, r: f32, g: f32, b: f32) -> [f32; 3] {
    match filter {
        FilterType::None => [r, g, b],
        FilterType::Grayscale => {
            let luma = 0.299 * r + 0.587 * g + 0.114 * b;
            [luma, luma, luma]
        }
        FilterType::Sepia => [
            0.393 * r + 0.769 * g + 0.189 * b,
            0.349 * r + 0.686 * g + 0.168 * b,
            0.272 * r + 0.534 * g + 0.131 * b,
        ],
        FilterType::Invert => [1.0 - r, 1.0 - g, 1.0 - b],
        FilterType::Warm => [r + 0.05, g + 0.03, b - 0.02],
        FilterType::Cool => [r - 0.02, g + 0.03, b + 0.05],
    }
}

/// Filter and blend one RGBA pixel, alpha untouched
#[inline]
pub fn apply_filter_pixel(px: [u8; 4], selection: FilterSelection) -> [u8; 4] {
    let strength = clamp_strength(selection.strength);
    let src = [
        px[0] as f32 / 255.0,
        px[1] as f32 / 255.0,
        px[2] as f32 / 255.0,
    ];
    let target = filter_target(selection.filter, src[0], src[1], src[2]);

    let mut out = [0u8, 0, 0, px[3]];
    for i in 0..3 {
        let t = target[i].clamp(0.0, 1.0);
        let mixed = src[i] + (t - src[i]) * strength;
        out[i] = (mixed * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// Apply a filter to a whole RGBA image on the CPU
pub fn apply_filter_cpu(image: &RgbaImage, selection: FilterSelection) -> RgbaImage {
    if selection.is_identity() {
        return image.clone();
    }

    let mut output = image.clone();
    for px in output.pixels_mut() {
        px.0 = apply_filter_pixel(px.0, selection);
    }
    output
}
