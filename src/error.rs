//! Error types for the insynctive library.

use thiserror::Error;

/// The main error type for insynctive operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing error.
    #[error("line error: {0}")]
    Line(#[from] LineError),

    /// Query got no answer, even after its single retry.
    #[error("query {command} timed out after {timeout_ms}ms")]
    Timeout { command: String, timeout_ms: u64 },

    /// Connection is not established.
    #[error("not connected")]
    NotConnected,

    /// The transport was stopped and cannot be restarted.
    #[error("transport stopped")]
    Stopped,

    /// Point index outside the bridge address space.
    #[error("invalid point index: {index} (valid: 1..={max})")]
    InvalidIndex { index: u32, max: u8 },

    /// Response channel closed before an answer arrived.
    #[error("channel closed")]
    ChannelClosed,
}

impl Error {
    /// Returns true if this error is a query timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Line-framing errors.
#[derive(Debug, Error)]
pub enum LineError {
    /// Buffered data exceeded the maximum line length without a terminator.
    #[error("line too long: {size} bytes exceeds maximum {max}")]
    TooLong { size: usize, max: usize },
}

/// Result type alias for insynctive operations.
pub type Result<T> = std::result::Result<T, Error>;
