//! Query/reply correlation for the Insynctive line protocol.
//!
//! The bridge answers queries on the same stream it uses for unsolicited
//! status pushes and command echoes, with no sequence numbers. This module
//! keeps a single pending-reply slot and serializes queries so that at most
//! one reply is awaited at any time.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, oneshot};

use crate::error::{Error, Result};
use crate::transport::Transport;

/// Default query timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// What [`CommandHandler::offer`] did with a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineDisposition {
    /// The bridge echoed the last command back; discarded.
    Echo,
    /// Resolved the pending query.
    Reply,
    /// Nothing was waiting for it; discarded.
    Unsolicited,
}

#[derive(Default)]
struct Slot {
    pending: Option<oneshot::Sender<String>>,
    last_command: Option<String>,
}

/// Serializes queries against one pending-reply slot.
pub struct CommandHandler<T> {
    transport: Arc<T>,
    query_lock: AsyncMutex<()>,
    slot: Mutex<Slot>,
}

impl<T: Transport> CommandHandler<T> {
    /// Creates a new command handler.
    #[must_use]
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            query_lock: AsyncMutex::new(()),
            slot: Mutex::new(Slot::default()),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sends `command` and waits for its reply line.
    ///
    /// `timeout` covers both the write and the reply. A query that does not
    /// complete within it is sent once more with the same timeout.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotConnected` if the transport is down, or
    /// `Error::Timeout` if both attempts go unanswered.
    pub async fn query(&self, command: &str, timeout: Duration) -> Result<String> {
        let command = command.trim();
        let _guard = self.query_lock.lock().await;

        if !self.transport.is_connected() {
            return Err(Error::NotConnected);
        }

        let result = match self.send_and_wait(command, timeout).await {
            Err(e) if e.is_timeout() => {
                tracing::debug!("timeout waiting for reply to {}; retrying once", command);
                self.send_and_wait(command, timeout).await
            }
            other => other,
        };

        self.slot().pending = None;
        result
    }

    async fn send_and_wait(&self, command: &str, timeout: Duration) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        {
            let mut slot = self.slot();
            slot.pending = Some(tx);
            slot.last_command = Some(command.to_owned());
        }

        let exchange = async {
            self.transport.send(command).await;
            rx.await
        };
        match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(line)) => Ok(line),
            Ok(Err(_)) => Err(Error::ChannelClosed),
            Err(_) => Err(Error::Timeout {
                command: command.to_owned(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Sends a command that expects no reply.
    ///
    /// Waits for any in-flight query to finish first, and records the
    /// command so its echo is recognized.
    pub async fn send_only(&self, command: &str) {
        let command = command.trim();
        let _guard = self.query_lock.lock().await;
        self.slot().last_command = Some(command.to_owned());
        self.transport.send(command).await;
    }

    /// Offers an inbound line that is not a status push.
    ///
    /// A line equal to the last sent command is an echo. Otherwise the line
    /// resolves the pending query, if there is one.
    pub fn offer(&self, line: &str) -> LineDisposition {
        let mut slot = self.slot();
        if slot.last_command.as_deref() == Some(line.trim()) {
            return LineDisposition::Echo;
        }
        match slot.pending.take().map(|tx| tx.send(line.to_owned())) {
            Some(Ok(())) => LineDisposition::Reply,
            _ => LineDisposition::Unsolicited,
        }
    }

    /// Returns true if a query is waiting for its reply.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.slot().pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LineHandler;
    use crate::transport::mock::MockTransport;
    use futures::FutureExt;

    async fn handler_with(transport: &Arc<MockTransport>) -> Arc<CommandHandler<MockTransport>> {
        let commands = Arc::new(CommandHandler::new(Arc::clone(transport)));
        let weak = Arc::downgrade(&commands);
        let on_line: LineHandler = Arc::new(move |line: String| {
            let weak = weak.clone();
            async move {
                if let Some(commands) = weak.upgrade() {
                    commands.offer(&line);
                }
            }
            .boxed()
        });
        transport.start(on_line).await.unwrap();
        commands
    }

    #[tokio::test]
    async fn test_query_returns_reply() {
        let transport = Arc::new(MockTransport::connected());
        transport.reply("?POINTID-003", &["POINTID-003,S083C57"]);
        let commands = handler_with(&transport).await;

        let reply = commands.query("?POINTID-003", DEFAULT_TIMEOUT).await.unwrap();
        assert_eq!(reply, "POINTID-003,S083C57");
        assert!(!commands.is_pending());
    }

    #[tokio::test]
    async fn test_echo_is_discarded() {
        let transport = Arc::new(MockTransport::connected());
        transport.set_echo(true);
        transport.reply("?POINTSTATUS-001", &["$01"]);
        let commands = handler_with(&transport).await;

        let reply = commands
            .query("?POINTSTATUS-001", DEFAULT_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(reply, "$01");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_retries_exactly_once() {
        let transport = Arc::new(MockTransport::connected());
        let commands = handler_with(&transport).await;

        let err = commands
            .query("?POINTCOUNT", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(transport.sent_count("?POINTCOUNT"), 2);
        assert!(!commands.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_reply_resolves_retry() {
        let transport = Arc::new(MockTransport::connected());
        let commands = handler_with(&transport).await;

        let query = {
            let commands = Arc::clone(&commands);
            tokio::spawn(async move { commands.query("?POINTCOUNT", Duration::from_secs(5)).await })
        };

        // First attempt times out; answer the retry.
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(commands.is_pending());
        transport.inject("4").await;

        assert_eq!(query.await.unwrap().unwrap(), "4");
        assert_eq!(transport.sent_count("?POINTCOUNT"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_write_times_out() {
        let transport = Arc::new(MockTransport::connected());
        transport.set_stalled(true);
        let commands = handler_with(&transport).await;

        let started = tokio::time::Instant::now();
        let err = commands
            .query("?POINTCOUNT", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() >= Duration::from_millis(400));
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(transport.sent_count("?POINTCOUNT"), 2);

        // The query lock is free again.
        transport.set_stalled(false);
        transport.reply("?POINTCOUNT", &["3"]);
        assert_eq!(commands.query("?POINTCOUNT", DEFAULT_TIMEOUT).await.unwrap(), "3");
    }

    #[tokio::test]
    async fn test_not_connected() {
        let transport = Arc::new(MockTransport::connected());
        transport.set_state(crate::transport::ConnectionState::Disconnected);
        let commands = handler_with(&transport).await;

        let err = commands.query("?POINTCOUNT", DEFAULT_TIMEOUT).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_offer_without_pending_is_unsolicited() {
        let transport = Arc::new(MockTransport::connected());
        let commands = handler_with(&transport).await;
        assert_eq!(commands.offer("HELLO"), LineDisposition::Unsolicited);
    }

    #[tokio::test]
    async fn test_send_only_records_echo() {
        let transport = Arc::new(MockTransport::connected());
        let commands = handler_with(&transport).await;

        commands.send_only("!POINTSET-005,$0A").await;
        assert_eq!(transport.sent(), ["!POINTSET-005,$0A"]);
        assert_eq!(commands.offer("!POINTSET-005,$0A"), LineDisposition::Echo);
    }
}
