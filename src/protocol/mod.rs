//! Protocol definitions for Insynctive communication.
//!
//! This module contains the low-level protocol types including:
//! - Line encoding/decoding
//! - Command text
//! - Reply and push parsing

pub mod command;
pub mod line;
pub mod parser;

pub use command::{Command, MAX_POINTS, SHADE_STOP, point_index};
pub use line::{LINE_TERMINATOR, LineDecoder, MAX_LINE_LEN, encode as encode_line};
pub use parser::{
    PushStatus, parse_battery, parse_device_type, parse_point_count, parse_point_id, parse_push,
    parse_status,
};
