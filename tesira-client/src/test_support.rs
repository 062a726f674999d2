//! In-memory [`LineSender`] for unit tests

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::TransportError;
use crate::transport::LineSender;

/// Records every line sent; connection state is toggled by the test
#[derive(Debug)]
pub struct RecordingSender {
    sent: Mutex<Vec<String>>,
    connected: AtomicBool,
}

impl RecordingSender {
    pub fn connected() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        }
    }

    pub fn disconnected() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            connected: AtomicBool::new(false),
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Return and forget everything sent so far
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl LineSender for RecordingSender {
    fn send_line(&self, line: &str) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.sent.lock().push(line.to_string());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
