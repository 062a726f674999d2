//! Line framing for the inbound byte stream
//!
//! The device terminates lines with CR or CRLF. Serial links occasionally drop
//! to bare LF, so any of the three ends a line. Empty lines are skipped.

/// Default upper bound for a single buffered line
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// Incremental splitter turning arbitrary byte chunks into complete lines
#[derive(Debug)]
pub struct LineFramer {
    buffer: Vec<u8>,
    max_line_length: usize,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::with_max_line_length(DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_line_length,
        }
    }

    /// Feed a chunk and collect every line it completes
    ///
    /// A line longer than the limit is flushed as-is rather than growing the
    /// buffer without bound.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for &byte in chunk {
            if byte == b'\r' || byte == b'\n' {
                self.flush_into(&mut lines);
                continue;
            }

            self.buffer.push(byte);
            if self.buffer.len() >= self.max_line_length {
                self.flush_into(&mut lines);
            }
        }

        lines
    }

    /// Bytes received since the last terminator
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    fn flush_into(&mut self, lines: &mut Vec<String>) {
        if self.buffer.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        lines.push(line);
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}
