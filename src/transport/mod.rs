//! Transport layer for Insynctive communication.
//!
//! This module provides the abstraction the coordinator talks through.
//! The bridge speaks plain TCP; [`TcpLineTransport`] is the production
//! implementation.

pub mod backoff;
#[cfg(test)]
pub(crate) mod mock;
pub mod tcp;

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::watch;

use crate::error::Result;

/// Callback receiving each complete inbound line.
pub type LineHandler = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

/// Connection state of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket; a reconnect may be pending.
    Disconnected,
    /// Connection attempt in progress.
    Connecting,
    /// Socket open and being read.
    Connected,
    /// Stopped for good.
    Stopped,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Trait for transport implementations.
pub trait Transport: Send + Sync {
    /// Starts the connection task, delivering inbound lines to `on_line`.
    fn start(&self, on_line: LineHandler) -> BoxFuture<'_, Result<()>>;

    /// Stops the connection task and waits for it to finish.
    ///
    /// No line is delivered after this returns.
    fn stop(&self) -> BoxFuture<'_, ()>;

    /// Sends one line. Dropped with a log entry when not connected.
    fn send<'a>(&'a self, line: &'a str) -> BoxFuture<'a, ()>;

    /// Returns true if connected.
    fn is_connected(&self) -> bool;

    /// Watches the connection state.
    fn connection_state(&self) -> watch::Receiver<ConnectionState>;
}

pub use backoff::Backoff;
pub use tcp::{TcpConfig, TcpLineTransport};
