use std::collections::VecDeque;

use crate::error::{ChorusError, Result};

/// Longest unterminated line held before the stream is abandoned
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Byte buffer that hands out complete `\n`-terminated lines.
///
/// Lines are trimmed of surrounding whitespace (including `\r`). Bytes that
/// are not valid UTF-8 are replaced rather than rejected, so one corrupt
/// line never poisons the rest of the stream.
pub struct CircularLineBuffer {
    buffer: VecDeque<u8>,
    /// Bytes already searched for a newline
    scanned: usize,
    max_line_len: usize,
}

impl CircularLineBuffer {
    /// Create a new buffer with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_line_limit(capacity, MAX_LINE_LEN)
    }

    pub fn with_line_limit(capacity: usize, max_line_len: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            scanned: 0,
            max_line_len,
        }
    }

    /// Add bytes to the buffer
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend(bytes);
    }

    /// Extract next line (up to \n) from buffer
    /// Returns None if no complete line is available
    pub fn next_line(&mut self) -> Option<String> {
        let Some(offset) = self.buffer.range(self.scanned..).position(|&b| b == b'\n') else {
            self.scanned = self.buffer.len();
            return None;
        };

        let newline_pos = self.scanned + offset;
        self.scanned = 0;
        let line_bytes: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
        Some(String::from_utf8_lossy(&line_bytes).trim().to_string())
    }

    /// Fail once the pending partial line outgrows the limit.
    /// Call after draining every complete line.
    pub fn check_line_limit(&self) -> Result<()> {
        if self.buffer.len() > self.max_line_len {
            return Err(ChorusError::LineTooLong(self.max_line_len));
        }
        Ok(())
    }

    /// Drain whatever is left once the source is exhausted.
    /// A stream may end without a trailing newline.
    pub fn take_remaining(&mut self) -> Option<String> {
        self.scanned = 0;
        if self.buffer.is_empty() {
            return None;
        }
        let rest: Vec<u8> = self.buffer.drain(..).collect();
        Some(String::from_utf8_lossy(&rest).trim().to_string())
    }

    /// Current buffer size
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
