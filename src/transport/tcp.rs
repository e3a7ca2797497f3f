//! TCP line transport implementation.
//!
//! This module keeps a persistent TCP connection to an Insynctive bridge,
//! reconnecting with exponential backoff whenever the socket fails.

use std::io;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::protocol::{LineDecoder, encode_line};
use crate::transport::{Backoff, ConnectionState, LineHandler, Transport};

/// Default bridge telnet port.
pub const DEFAULT_PORT: u16 = 23;

/// Default first reconnect delay.
pub const DEFAULT_RECONNECT_MIN: Duration = Duration::from_secs(2);

/// Default reconnect delay cap.
pub const DEFAULT_RECONNECT_MAX: Duration = Duration::from_secs(60);

/// Default limit on a single connection attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default limit on writing one line before the connection is dropped.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for TCP transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpConfig {
    /// Bridge host name or IP address.
    pub host: String,
    /// Bridge TCP port.
    pub port: u16,
    /// First reconnect delay; doubles on every failed attempt.
    pub reconnect_min: Duration,
    /// Upper bound for the reconnect delay.
    pub reconnect_max: Duration,
    /// Limit on a single connection attempt.
    pub connect_timeout: Duration,
    /// Limit on writing one line; a slower write drops the connection.
    pub write_timeout: Duration,
}

impl TcpConfig {
    /// Creates a new TCP configuration with default settings.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            reconnect_min: DEFAULT_RECONNECT_MIN,
            reconnect_max: DEFAULT_RECONNECT_MAX,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the reconnect delay bounds.
    #[must_use]
    pub const fn reconnect(mut self, min: Duration, max: Duration) -> Self {
        self.reconnect_min = min;
        self.reconnect_max = max;
        self
    }

    /// Sets the connection attempt timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-line write timeout.
    #[must_use]
    pub const fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// `host:port` as passed to the socket.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// An open connection's write side, with the token that ends its read loop.
struct Connection {
    writer: OwnedWriteHalf,
    token: CancellationToken,
}

/// State shared between the transport handle and its run task.
struct Link {
    connection: Mutex<Option<Connection>>,
    /// Token of the open connection, reachable while a writer holds `connection`.
    active: StdMutex<Option<CancellationToken>>,
    state: watch::Sender<ConnectionState>,
}

impl Link {
    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    async fn open(&self, writer: OwnedWriteHalf, token: CancellationToken) {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        *self.connection.lock().await = Some(Connection { writer, token });
    }

    /// Drops the current connection, if any.
    ///
    /// The token is cancelled before the lock is taken so a blocked write
    /// gives the connection up.
    async fn close(&self) {
        let active = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(token) = active {
            token.cancel();
        }
        if let Some(mut conn) = self.connection.lock().await.take() {
            conn.token.cancel();
            if let Err(e) = conn.writer.shutdown().await {
                tracing::trace!("socket shutdown failed: {}", e);
            }
        }
    }
}

/// Persistent TCP transport for an Insynctive bridge.
///
/// Owns one background task that connects, reads lines, and reconnects
/// with exponential backoff until [`stop`](Transport::stop) is called.
pub struct TcpLineTransport {
    config: TcpConfig,
    link: Arc<Link>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TcpLineTransport {
    /// Creates a new TCP transport with the given configuration.
    #[must_use]
    pub fn new(config: TcpConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            link: Arc::new(Link {
                connection: Mutex::new(None),
                active: StdMutex::new(None),
                state,
            }),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Returns the transport configuration.
    #[must_use]
    pub const fn config(&self) -> &TcpConfig {
        &self.config
    }

    /// Connect/read/reconnect loop. Runs until `cancel` fires.
    async fn run(
        config: TcpConfig,
        link: Arc<Link>,
        cancel: CancellationToken,
        on_line: LineHandler,
    ) {
        let address = config.address();
        let mut backoff = Backoff::new(config.reconnect_min, config.reconnect_max);

        loop {
            link.set_state(ConnectionState::Connecting);
            tracing::info!("connecting to {}", address);

            let attempt = tokio::select! {
                () = cancel.cancelled() => break,
                result = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&address)) => result,
            };

            match attempt {
                Ok(Ok(stream)) => {
                    backoff.reset();
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!("failed to set TCP_NODELAY: {}", e);
                    }
                    let (reader, writer) = stream.into_split();
                    let token = cancel.child_token();
                    link.open(writer, token.clone()).await;
                    link.set_state(ConnectionState::Connected);
                    tracing::info!("connected to {}", address);

                    match Self::read_loop(reader, &token, &on_line).await {
                        Err(e) => tracing::warn!("connection to {} lost: {}", address, e),
                        Ok(()) if !cancel.is_cancelled() => {
                            tracing::warn!("connection to {} lost: write failed", address);
                        }
                        Ok(()) => {}
                    }
                }
                Ok(Err(e)) => tracing::warn!("connect to {} failed: {}", address, e),
                Err(_) => tracing::warn!(
                    "connect to {} timed out after {:?}",
                    address,
                    config.connect_timeout
                ),
            }

            link.close().await;
            link.set_state(ConnectionState::Disconnected);

            if cancel.is_cancelled() {
                break;
            }

            let delay = backoff.next_delay();
            tracing::info!("reconnecting in {:?}", delay);
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        link.close().await;
        link.set_state(ConnectionState::Stopped);
        tracing::debug!("transport task for {} exited", address);
    }

    /// Reads lines until the socket fails or `token` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error on read failure or when the peer closes the socket.
    async fn read_loop(
        mut reader: OwnedReadHalf,
        token: &CancellationToken,
        on_line: &LineHandler,
    ) -> Result<()> {
        let mut decoder = LineDecoder::new();
        let mut buf = [0u8; 1024];

        loop {
            let n = tokio::select! {
                () = token.cancelled() => return Ok(()),
                result = reader.read(&mut buf) => result?,
            };
            if n == 0 {
                if decoder.buffered() > 0 {
                    tracing::debug!(
                        "dropping {} bytes of unterminated input",
                        decoder.buffered()
                    );
                }
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "socket closed",
                )));
            }

            tracing::trace!("received {} bytes", n);
            decoder.feed(&buf[..n]);

            // Process all complete lines
            loop {
                match decoder.decode() {
                    Ok(Some(line)) => {
                        tracing::debug!("RX: {}", line);
                        on_line(line).await;
                    }
                    Ok(None) => break,
                    Err(e) => tracing::warn!("line decode error: {}", e),
                }
            }
        }
    }

    async fn write_line(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        let mut connection = self.link.connection.lock().await;
        let Some(conn) = connection.as_mut().filter(|c| !c.token.is_cancelled()) else {
            tracing::debug!("TX dropped (not connected): {}", line);
            return;
        };

        // Dropping this future mid-write tears the connection down.
        let token = conn.token.clone();
        let guard = token.clone().drop_guard();
        let frame = encode_line(line);
        let result = tokio::select! {
            biased;
            () = token.cancelled() => None,
            result = tokio::time::timeout(
                self.config.write_timeout,
                write_frame(&mut conn.writer, &frame),
            ) => Some(result.unwrap_or_else(|_| {
                Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out"))
            })),
        };

        match result {
            Some(Ok(())) => {
                drop(guard.disarm());
                tracing::debug!("TX: {}", line);
            }
            Some(Err(e)) => {
                tracing::debug!("TX failed, closing: {}", e);
                drop(guard);
                connection.take();
                self.link.set_state(ConnectionState::Disconnected);
            }
            None => tracing::debug!("TX aborted, connection closing: {}", line),
        }
    }
}

async fn write_frame(writer: &mut OwnedWriteHalf, frame: &[u8]) -> io::Result<()> {
    writer.write_all(frame).await?;
    writer.flush().await
}

impl Transport for TcpLineTransport {
    fn start(&self, on_line: LineHandler) -> BoxFuture<'_, Result<()>> {
        async move {
            if self.cancel.is_cancelled() {
                return Err(Error::Stopped);
            }
            let mut task = self.task.lock().await;
            if task.is_some() {
                return Ok(());
            }
            *task = Some(tokio::spawn(Self::run(
                self.config.clone(),
                Arc::clone(&self.link),
                self.cancel.clone(),
                on_line,
            )));
            Ok(())
        }
        .boxed()
    }

    fn stop(&self) -> BoxFuture<'_, ()> {
        async move {
            self.cancel.cancel();
            if let Some(task) = self.task.lock().await.take() {
                if let Err(e) = task.await {
                    tracing::warn!("transport task failed: {}", e);
                }
            }
            self.link.close().await;
            self.link.set_state(ConnectionState::Stopped);
        }
        .boxed()
    }

    fn send<'a>(&'a self, line: &'a str) -> BoxFuture<'a, ()> {
        self.write_line(line).boxed()
    }

    fn is_connected(&self) -> bool {
        *self.link.state.borrow() == ConnectionState::Connected
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.link.state.subscribe()
    }
}

impl Drop for TcpLineTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
