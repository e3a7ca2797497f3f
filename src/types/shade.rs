//! Shade travel conversion.
//!
//! Insynctive shades report and accept inverted travel: native `0` is
//! fully open and native `100` fully closed. Positions exposed by this
//! crate use the usual convention, `100` meaning fully open.

/// Clamps a requested position and converts it to the native byte.
#[must_use]
pub fn position_to_native(percent: i32) -> u8 {
    let percent = u8::try_from(percent.clamp(0, 100)).unwrap_or(0);
    100 - percent
}

/// Converts a native byte back to a position, clamping out-of-range values.
#[must_use]
pub fn native_to_position(native: u8) -> u8 {
    100 - native.min(100)
}
