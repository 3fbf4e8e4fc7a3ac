// SPDX-License-Identifier: GPL-3.0-only

//! Recording output device shared by the sink and pipeline tests

#![allow(dead_code)]

use filtercam::backends::virtual_camera::{DeviceOpener, OutputDevice, OutputFormat};
use std::cell::RefCell;
use std::io;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Open(String),
    SetFormat(u32, u32),
    Write(usize),
    Close,
}

/// Behavior switches plus everything the fake devices observed
#[derive(Debug, Default)]
pub struct MockState {
    pub events: Vec<Event>,
    pub frames: Vec<Vec<u8>>,
    pub fail_open: bool,
    pub fail_format: bool,
    pub short_write: bool,
}

pub type Shared = Rc<RefCell<MockState>>;

pub struct MockDevice {
    state: Shared,
}

impl OutputDevice for MockDevice {
    fn set_format(&mut self, format: &OutputFormat) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_format {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "Invalid argument"));
        }
        state.events.push(Event::SetFormat(format.width, format.height));
        Ok(())
    }

    fn write_frame(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();
        let accepted = if state.short_write {
            data.len() / 2
        } else {
            data.len()
        };
        state.events.push(Event::Write(accepted));
        state.frames.push(data.to_vec());
        Ok(accepted)
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.state.borrow_mut().events.push(Event::Close);
    }
}

#[derive(Clone, Default)]
pub struct MockOpener {
    pub state: Shared,
}

impl MockOpener {
    pub fn new() -> (Self, Shared) {
        let opener = Self::default();
        let state = opener.state.clone();
        (opener, state)
    }
}

impl DeviceOpener for MockOpener {
    fn open(&mut self, path: &str) -> io::Result<Box<dyn OutputDevice>> {
        if self.state.borrow().fail_open {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "No such file or directory",
            ));
        }
        self.state
            .borrow_mut()
            .events
            .push(Event::Open(path.to_string()));
        Ok(Box::new(MockDevice {
            state: self.state.clone(),
        }))
    }
}

/// Take the recorded events, leaving the log empty
pub fn take_events(state: &Shared) -> Vec<Event> {
    std::mem::take(&mut state.borrow_mut().events)
}
