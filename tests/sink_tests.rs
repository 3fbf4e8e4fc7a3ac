// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the virtual camera device sink

mod common;

use common::{Event, MockOpener, take_events};
use filtercam::backends::virtual_camera::{SinkState, VirtualCameraSink};
use filtercam::diagnostics::{self, Diagnostics, DiagnosticsReceiver};
use filtercam::media::yuyv_frame_size;
use filtercam::{Resolution, VcamError};
use image::{Rgb, RgbImage};

fn enabled_sink() -> (
    VirtualCameraSink<MockOpener>,
    common::Shared,
    DiagnosticsReceiver,
) {
    let (opener, state) = MockOpener::new();
    let (diagnostics, receiver) = Diagnostics::channel();
    let mut sink = VirtualCameraSink::with_opener(opener, diagnostics);
    sink.set_enabled(true);
    (sink, state, receiver)
}

fn frame(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([200, 120, 40]))
}

#[test]
fn test_first_frame_opens_and_negotiates() {
    let (mut sink, state, mut receiver) = enabled_sink();
    assert_eq!(sink.state(), SinkState::Closed);

    assert!(sink.on_processed_frame(frame(1280, 720)));
    assert_eq!(
        take_events(&state),
        vec![
            Event::Open("/dev/video42".into()),
            Event::SetFormat(1280, 720),
            Event::Write(yuyv_frame_size(1280, 720)),
        ]
    );
    assert_eq!(
        sink.state(),
        SinkState::Configured(Resolution::new(1280, 720))
    );
    assert_eq!(sink.frames_written(), 1);
    assert!(diagnostics::drain(&mut receiver).is_empty());
}

#[test]
fn test_same_geometry_only_writes() {
    let (mut sink, state, _receiver) = enabled_sink();
    assert!(sink.on_processed_frame(frame(640, 480)));
    take_events(&state);

    assert!(sink.on_processed_frame(frame(640, 480)));
    assert!(sink.on_processed_frame(frame(640, 480)));
    assert_eq!(
        take_events(&state),
        vec![
            Event::Write(yuyv_frame_size(640, 480)),
            Event::Write(yuyv_frame_size(640, 480)),
        ]
    );
    assert_eq!(sink.frames_written(), 3);
}

#[test]
fn test_geometry_change_reopens_and_renegotiates() {
    let (mut sink, state, mut receiver) = enabled_sink();
    assert!(sink.on_processed_frame(frame(1280, 720)));
    take_events(&state);

    assert!(sink.on_processed_frame(frame(640, 480)));
    assert_eq!(
        take_events(&state),
        vec![
            Event::Close,
            Event::Open("/dev/video42".into()),
            Event::SetFormat(640, 480),
            Event::Write(640 * 480 * 2),
        ]
    );
    assert_eq!(sink.state(), SinkState::Configured(Resolution::new(640, 480)));
    assert!(diagnostics::drain(&mut receiver).is_empty());
}

#[test]
fn test_forced_resolution_fits_frames() {
    let (mut sink, state, _receiver) = enabled_sink();
    sink.set_forced_resolution(Some(Resolution::new(1280, 720)));

    assert!(sink.on_processed_frame(frame(1920, 1080)));
    // Different aspect still ends up at the pinned size
    assert!(sink.on_processed_frame(frame(640, 480)));

    assert_eq!(
        take_events(&state),
        vec![
            Event::Open("/dev/video42".into()),
            Event::SetFormat(1280, 720),
            Event::Write(1280 * 720 * 2),
            Event::Write(1280 * 720 * 2),
        ]
    );
}

#[test]
fn test_forced_resolution_change_closes() {
    let (mut sink, state, _receiver) = enabled_sink();
    assert!(sink.on_processed_frame(frame(320, 240)));
    take_events(&state);

    sink.set_forced_resolution(Some(Resolution::new(160, 120)));
    assert_eq!(take_events(&state), vec![Event::Close]);
    assert_eq!(sink.state(), SinkState::Closed);

    // Zero-sized means "not forced"
    sink.set_forced_resolution(Some(Resolution::new(0, 0)));
    assert_eq!(sink.forced_resolution(), None);
}

#[test]
fn test_short_write_closes_disables_and_reports() {
    let (mut sink, state, mut receiver) = enabled_sink();
    state.borrow_mut().short_write = true;

    assert!(!sink.on_processed_frame(frame(64, 48)));
    let expected = yuyv_frame_size(64, 48);
    assert_eq!(
        take_events(&state),
        vec![
            Event::Open("/dev/video42".into()),
            Event::SetFormat(64, 48),
            Event::Write(expected / 2),
            Event::Close,
        ]
    );
    assert_eq!(sink.state(), SinkState::Closed);
    assert!(!sink.is_enabled());
    assert_eq!(sink.frames_written(), 0);

    let errors = diagnostics::drain(&mut receiver);
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        VcamError::ShortWrite {
            written,
            expected: total,
            ..
        } => {
            assert_eq!(*written, expected / 2);
            assert_eq!(*total, expected);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    // Stays off: later frames are dropped without touching the device
    state.borrow_mut().short_write = false;
    assert!(!sink.on_processed_frame(frame(64, 48)));
    assert!(take_events(&state).is_empty());
}

#[test]
fn test_open_failure_reports_and_disables() {
    let (mut sink, state, mut receiver) = enabled_sink();
    sink.set_device_path("/dev/video9");
    state.borrow_mut().fail_open = true;

    assert!(!sink.on_processed_frame(frame(32, 32)));
    assert!(!sink.is_enabled());
    assert_eq!(sink.state(), SinkState::Closed);

    let errors = diagnostics::drain(&mut receiver);
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        &errors[0],
        VcamError::DeviceOpen { path, .. } if path == "/dev/video9"
    ));
    assert!(errors[0].to_string().contains("/dev/video9"));

    // Explicit re-enable retries from scratch
    state.borrow_mut().fail_open = false;
    sink.set_enabled(true);
    assert!(sink.on_processed_frame(frame(32, 32)));
    assert_eq!(
        take_events(&state),
        vec![
            Event::Open("/dev/video9".into()),
            Event::SetFormat(32, 32),
            Event::Write(32 * 32 * 2),
        ]
    );
}

#[test]
fn test_format_negotiation_failure() {
    let (mut sink, state, mut receiver) = enabled_sink();
    state.borrow_mut().fail_format = true;

    assert!(!sink.on_processed_frame(frame(16, 16)));
    assert_eq!(
        take_events(&state),
        vec![Event::Open("/dev/video42".into()), Event::Close]
    );
    // Never left holding an unnegotiated handle
    assert_eq!(sink.state(), SinkState::Closed);
    assert!(!sink.is_enabled());

    let errors = diagnostics::drain(&mut receiver);
    assert!(matches!(errors.as_slice(), [VcamError::FormatNegotiation(_)]));
}

#[test]
fn test_device_path_change_closes() {
    let (mut sink, state, _receiver) = enabled_sink();
    assert!(sink.on_processed_frame(frame(8, 8)));
    take_events(&state);

    // Whitespace-only difference is not a change
    sink.set_device_path("  /dev/video42 ");
    assert!(take_events(&state).is_empty());
    assert!(matches!(sink.state(), SinkState::Configured(_)));

    sink.set_device_path("/dev/video7");
    assert_eq!(take_events(&state), vec![Event::Close]);
    assert_eq!(sink.state(), SinkState::Closed);
    assert!(sink.is_enabled());

    assert!(sink.on_processed_frame(frame(8, 8)));
    assert_eq!(
        take_events(&state).first(),
        Some(&Event::Open("/dev/video7".into()))
    );
}

#[test]
fn test_blank_device_path_uses_default() {
    let (mut sink, _state, _receiver) = enabled_sink();
    sink.set_device_path("/dev/video3");
    sink.set_device_path("   ");
    assert_eq!(sink.device_path(), "/dev/video42");
}

#[test]
fn test_disable_releases_device_immediately() {
    let (mut sink, state, mut receiver) = enabled_sink();
    assert!(sink.on_processed_frame(frame(8, 8)));
    take_events(&state);

    sink.set_enabled(false);
    assert_eq!(take_events(&state), vec![Event::Close]);
    assert_eq!(sink.state(), SinkState::Closed);

    assert!(!sink.on_processed_frame(frame(8, 8)));
    assert!(take_events(&state).is_empty());
    assert!(diagnostics::drain(&mut receiver).is_empty());
}

#[test]
fn test_disabled_by_default() {
    let (opener, state) = MockOpener::new();
    let mut sink = VirtualCameraSink::with_opener(opener, Diagnostics::log_only());
    assert!(!sink.is_enabled());
    assert!(!sink.on_processed_frame(frame(8, 8)));
    assert!(take_events(&state).is_empty());
}

#[test]
fn test_empty_frame_is_ignored() {
    let (mut sink, state, mut receiver) = enabled_sink();
    assert!(!sink.on_processed_frame(RgbImage::new(0, 0)));
    assert!(take_events(&state).is_empty());
    assert!(sink.is_enabled());
    assert!(diagnostics::drain(&mut receiver).is_empty());
}

#[test]
fn test_odd_width_frame_size() {
    let (mut sink, state, _receiver) = enabled_sink();
    assert!(sink.on_processed_frame(frame(5, 3)));
    assert_eq!(state.borrow().frames[0].len(), 5 * 3 * 2);
}

#[test]
fn test_drop_closes_device() {
    let (mut sink, state, _receiver) = enabled_sink();
    assert!(sink.on_processed_frame(frame(8, 8)));
    take_events(&state);

    drop(sink);
    assert_eq!(take_events(&state), vec![Event::Close]);
}
