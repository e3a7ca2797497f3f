//! Data types for Insynctive entities.
//!
//! This module contains the core data structures used throughout the library:
//! - Device records and the device table
//! - Device kinds with their naming and model tables
//! - Raw hex byte values
//! - Shade travel conversion

pub mod device;
pub mod shade;
pub mod value;

pub use device::{DEFAULT_LABEL, DEFAULT_MODEL, DeviceKind, DeviceRecord, DeviceTable, default_name};
pub use value::HexByte;
