//! Line framing for the Insynctive protocol.
//!
//! The bridge speaks newline-terminated text:
//! ```text
//! ┌──────────────────────┬──────┬──────┐
//! │  ASCII payload       │  CR  │  LF  │
//! └──────────────────────┴──────┴──────┘
//! ```
//! Inbound lines may end in a bare LF; the decoder accepts either.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::LineError;

/// Line terminator appended to every outbound command.
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Maximum buffered bytes without a terminator before the data is dropped.
pub const MAX_LINE_LEN: usize = 4096;

/// Encodes a command into a terminated wire line.
///
/// Surrounding whitespace is stripped before the terminator is appended.
#[must_use]
pub fn encode(line: &str) -> Bytes {
    let line = line.trim();
    let mut buf = BytesMut::with_capacity(line.len() + LINE_TERMINATOR.len());
    buf.put_slice(line.as_bytes());
    buf.put_slice(LINE_TERMINATOR);
    buf.freeze()
}

/// Line decoder that handles partial reads.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: BytesMut,
    discarding: bool,
}

impl LineDecoder {
    /// Creates a new line decoder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
            discarding: false,
        }
    }

    /// Feeds data into the decoder.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next non-blank line.
    ///
    /// Returns `Ok(Some(line))` with surrounding whitespace trimmed,
    /// `Ok(None)` if more data is needed. Bytes that are not valid UTF-8
    /// are replaced rather than rejected.
    ///
    /// # Errors
    ///
    /// Returns `LineError::TooLong` when more than [`MAX_LINE_LEN`] bytes
    /// arrive without a terminator. The buffered bytes are dropped and the
    /// decoder skips ahead to the next newline.
    pub fn decode(&mut self) -> Result<Option<String>, LineError> {
        loop {
            let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') else {
                if self.buffer.len() > MAX_LINE_LEN {
                    let size = self.buffer.len();
                    self.buffer.clear();
                    self.discarding = true;
                    return Err(LineError::TooLong {
                        size,
                        max: MAX_LINE_LEN,
                    });
                }
                return Ok(None);
            };

            let raw = self.buffer.split_to(pos + 1);
            if self.discarding {
                // Tail of an oversized line
                self.discarding = false;
                continue;
            }

            let line = String::from_utf8_lossy(&raw).trim().to_owned();
            if line.is_empty() {
                continue;
            }
            return Ok(Some(line));
        }
    }

    /// Returns the number of bytes currently buffered.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
