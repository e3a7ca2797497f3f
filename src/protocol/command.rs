//! Commands for the Insynctive line protocol.
//!
//! Queries start with `?` and are answered by exactly one line.
//! Set commands start with `!` and carry no guaranteed reply.
//! Point indices are written as zero-padded 3-digit numbers and values
//! as `$`-prefixed 2-digit uppercase hex.

use std::fmt;

use crate::error::{Error, Result};

/// Number of addressable points on a bridge.
pub const MAX_POINTS: u8 = 128;

/// `!POINTSET` value that halts a moving shade.
pub const SHADE_STOP: u8 = 0x6A;

/// Commands sent to the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Number of points paired with the bridge.
    PointCount,
    /// Device type code of a point.
    PointDevice(u8),
    /// Serial number of a point.
    PointId(u8),
    /// Raw status byte of a point.
    PointStatus(u8),
    /// Battery byte of a point.
    PointBatteryGet(u8),
    /// Writes a raw value to a point (shade motion).
    PointSet { index: u8, value: u8 },
}

impl Command {
    /// Returns true if the bridge answers this command with a reply line.
    #[must_use]
    pub const fn is_query(&self) -> bool {
        !matches!(self, Self::PointSet { .. })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PointCount => f.write_str("?POINTCOUNT"),
            Self::PointDevice(index) => write!(f, "?POINTDEVICE-{index:03}"),
            Self::PointId(index) => write!(f, "?POINTID-{index:03}"),
            Self::PointStatus(index) => write!(f, "?POINTSTATUS-{index:03}"),
            Self::PointBatteryGet(index) => write!(f, "?POINTBATTERYGET-{index:03}"),
            Self::PointSet { index, value } => write!(f, "!POINTSET-{index:03},${value:02X}"),
        }
    }
}

/// Validates a point index against the bridge address space.
///
/// # Errors
///
/// Returns `Error::InvalidIndex` unless `1 <= index <= MAX_POINTS`.
pub fn point_index(index: u32) -> Result<u8> {
    match u8::try_from(index) {
        Ok(i) if (1..=MAX_POINTS).contains(&i) => Ok(i),
        _ => Err(Error::InvalidIndex {
            index,
            max: MAX_POINTS,
        }),
    }
}
