//! Reply parsing for the Insynctive protocol.
//!
//! The bridge answers the same query in several shapes:
//! ```text
//! 0A
//! $0A
//! POINTSTATUS-001,0A
//! POINTSTATUS-001,$0A
//! ```
//! Every parser here accepts all of them. A reply that fits none of the
//! shapes yields `None` (or `0` for the point count); parsing never fails.

use crate::types::HexByte;

/// A status line pushed by the bridge without being queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushStatus {
    /// Point index as written on the wire (`000`–`999`).
    pub index: u16,
    /// New status byte.
    pub status: HexByte,
}

const PUSH_PREFIX: &str = "POINTSTATUS-";

/// Matches the unsolicited push shape `POINTSTATUS-III,VV` (or `,$VV`).
#[must_use]
pub fn parse_push(line: &str) -> Option<PushStatus> {
    let rest = line.strip_prefix(PUSH_PREFIX)?;
    let (digits, value) = rest.split_once(',')?;
    if digits.len() != 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value = value.strip_prefix('$').unwrap_or(value);
    let status = HexByte::from_hex(value)?;
    let index = digits.parse().ok()?;
    Some(PushStatus { index, status })
}

/// Parses a status reply.
///
/// Uses the text after the last comma, drops one leading `$`, and accepts
/// exactly two hex digits.
#[must_use]
pub fn parse_status(reply: &str) -> Option<HexByte> {
    let tail = reply.rsplit_once(',').map_or(reply, |(_, tail)| tail).trim();
    let tail = tail.strip_prefix('$').unwrap_or(tail);
    HexByte::from_hex(tail)
}

/// Parses a device type reply into its type code.
///
/// Prefers a `$XX` token anywhere in the line; falls back to a bare two
/// digit value after the comma.
#[must_use]
pub fn parse_device_type(reply: &str) -> Option<u8> {
    find_dollar_hex(reply)
        .or_else(|| HexByte::from_hex(after_comma(reply)))
        .map(HexByte::value)
}

/// Parses a point id (serial number) reply.
///
/// Replies starting with `?` are the bridge echoing an error and yield
/// `None`. Only alphanumerics, `-` and `_` are kept.
#[must_use]
pub fn parse_point_id(reply: &str) -> Option<String> {
    let tail = after_comma(reply);
    if tail.is_empty() || tail.starts_with('?') {
        return None;
    }
    let cleaned: String = tail
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(*c, '-' | '_'))
        .collect();
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Parses a battery reply.
#[must_use]
pub fn parse_battery(reply: &str) -> Option<HexByte> {
    find_dollar_hex(reply).or_else(|| {
        let tail = after_comma(reply);
        HexByte::from_hex(tail.strip_prefix('$').unwrap_or(tail))
    })
}

/// Parses a point count reply by keeping only its digits.
///
/// A reply without digits counts as zero. Counts too large for `u32`
/// saturate.
#[must_use]
pub fn parse_point_count(reply: &str) -> u32 {
    let digits: String = reply.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return 0;
    }
    digits.parse().unwrap_or(u32::MAX)
}

/// Returns the trimmed text after the first comma, or the whole trimmed reply.
fn after_comma(reply: &str) -> &str {
    reply.split_once(',').map_or(reply, |(_, tail)| tail).trim()
}

/// Finds the first `$` followed by two hex digits.
fn find_dollar_hex(reply: &str) -> Option<HexByte> {
    reply
        .match_indices('$')
        .find_map(|(pos, _)| reply.get(pos + 1..pos + 3).and_then(HexByte::from_hex))
}
