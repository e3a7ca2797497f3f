//! # insynctive
//!
//! A Rust client and device coordinator for Pella Insynctive bridges.
//!
//! The bridge exposes window/door, garage, lock, and shade sensor points
//! over a line-oriented telnet protocol. Replies, command echoes, and
//! unsolicited status pushes all share one stream with no sequence
//! numbers; this library keeps them apart and maintains a live table of
//! every point.
//!
//! ## Features
//!
//! - Async/await based API using Tokio
//! - Persistent connection with exponential reconnect backoff
//! - Single-slot query correlation with one retry on timeout
//! - Tolerant parsing of every reply shape the bridge produces
//! - Discovery, periodic status/battery sweeps, and shade control
//! - Change notification through callbacks or async subscriptions
//!
//! ## Quick Start
//!
//! ```no_run
//! use insynctive::{BridgeConfig, Coordinator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), insynctive::Error> {
//!     let coordinator = Coordinator::tcp(BridgeConfig::new("192.168.1.50"));
//!     let mut updates = coordinator.watch();
//!     coordinator.start().await?;
//!
//!     // The first snapshot arrives after discovery
//!     if let Some(devices) = updates.recv().await {
//!         for device in devices.values() {
//!             println!("{:03} {} ({})", device.index, device.name, device.model());
//!         }
//!     }
//!
//!     coordinator.open_shade(5).await?;
//!     coordinator.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`protocol`] - Line framing, command text, and reply parsing
//! - [`types`] - Device records, kinds, and raw values
//! - [`transport`] - Reconnecting TCP line transport
//! - [`commands`] - Query/reply correlation
//! - [`event`] - Change notification
//! - [`coordinator`] - High-level [`Coordinator`]

pub mod commands;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod protocol;
pub mod registry;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use commands::{CommandHandler, LineDisposition};
pub use config::{BridgeConfig, DeviceOverride, DeviceOverrides};
pub use coordinator::Coordinator;
pub use error::{Error, LineError, Result};
pub use event::{ChangeNotifier, Subscription, SubscriptionToken};
pub use protocol::{Command, MAX_POINTS};
pub use registry::{DeviceRegistry, RegistryUpdate};
pub use transport::{ConnectionState, TcpConfig, TcpLineTransport, Transport};
pub use types::{DeviceKind, DeviceRecord, DeviceTable, HexByte};
