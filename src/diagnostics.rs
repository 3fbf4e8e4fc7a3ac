// SPDX-License-Identifier: GPL-3.0-only

//! Diagnostics channel for surfacing pipeline failures to the UI
//!
//! Every report is logged and, if a receiver is attached, pushed onto an
//! unbounded channel. Reporting never blocks and never fails: a dropped
//! receiver simply turns the channel into a log-only sink.

use crate::errors::VcamError;
use tokio::sync::mpsc;
use tracing::warn;

/// Receiving end handed to the surrounding application
pub type DiagnosticsReceiver = mpsc::UnboundedReceiver<VcamError>;

/// Cloneable handle used by the renderer and sink to report failures
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    sender: Option<mpsc::UnboundedSender<VcamError>>,
}

impl Diagnostics {
    /// Create a connected diagnostics handle and its receiver
    pub fn channel() -> (Self, DiagnosticsReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// Handle that only logs
    pub fn log_only() -> Self {
        Self::default()
    }

    /// Report an error to the log and the attached receiver (if any)
    pub fn report(&self, error: VcamError) {
        warn!(error = %error, "Virtual camera pipeline error");

        if let Some(sender) = &self.sender {
            // Receiver gone means nobody is listening anymore
            let _ = sender.send(error);
        }
    }
}

/// Drain everything currently queued on a receiver without waiting
pub fn drain(receiver: &mut DiagnosticsReceiver) -> Vec<VcamError> {
    let mut errors = Vec::new();
    while let Ok(error) = receiver.try_recv() {
        errors.push(error);
    }
    errors
}
