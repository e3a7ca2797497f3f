//! Raw byte values reported by the bridge.

use std::fmt;

/// A single byte as the bridge writes it: two hex digits.
///
/// Status bytes are shown bare (`0A`), battery bytes with a leading
/// dollar sign (`$5A`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HexByte(u8);

impl HexByte {
    /// Wraps a raw byte.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    /// Returns the raw byte.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Parses exactly two hex digits, in either case.
    #[must_use]
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 2 {
            return None;
        }
        let mut byte = [0u8; 1];
        hex::decode_to_slice(s, &mut byte).ok()?;
        Some(Self(byte[0]))
    }

    /// Two uppercase hex digits, e.g. `0A`.
    #[must_use]
    pub fn to_hex(self) -> String {
        format!("{:02X}", self.0)
    }

    /// Dollar-prefixed form used for battery values, e.g. `$5A`.
    #[must_use]
    pub fn to_dollar_hex(self) -> String {
        format!("${:02X}", self.0)
    }
}

impl fmt::Display for HexByte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}", self.0)
    }
}

impl From<u8> for HexByte {
    fn from(value: u8) -> Self {
        Self(value)
    }
}
