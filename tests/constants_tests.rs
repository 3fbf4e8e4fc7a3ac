// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for constants module

use filtercam::FilterType;
use filtercam::constants::{file_formats, timing};
use std::time::Duration;

#[test]
fn test_frame_interval_matches_rate() {
    assert_eq!(timing::frame_interval(30), Duration::from_micros(33_333));
    assert_eq!(timing::frame_interval(60), Duration::from_micros(16_666));
}

#[test]
fn test_frame_interval_is_clamped() {
    // Above the limit behaves like the limit
    assert_eq!(
        timing::frame_interval(10_000),
        timing::frame_interval(timing::MAX_FRAME_RATE)
    );
    assert_eq!(timing::frame_interval(0), Duration::from_secs(1));
}

#[test]
fn test_image_extensions() {
    assert!(file_formats::is_image_extension("png"));
    assert!(file_formats::is_image_extension("JPG"));
    assert!(!file_formats::is_image_extension("mp4"));
}

#[test]
fn test_filter_codes_are_stable() {
    // Shader switch relies on these values
    let codes: Vec<u32> = FilterType::ALL.iter().map(FilterType::code).collect();
    assert_eq!(codes, vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn test_filter_names_parse_back() {
    for filter in FilterType::ALL {
        assert_eq!(filter.name().parse::<FilterType>(), Ok(filter));
    }
}
