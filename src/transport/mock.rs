//! In-memory scripted transport for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::watch;

use crate::error::Result;
use crate::transport::{ConnectionState, LineHandler, Transport};

/// Transport that answers sent lines from a script and records every send.
///
/// Replies are delivered through the line handler before `send` returns.
pub(crate) struct MockTransport {
    sent: Mutex<Vec<String>>,
    replies: Mutex<HashMap<String, Vec<String>>>,
    handler: Mutex<Option<LineHandler>>,
    state: watch::Sender<ConnectionState>,
    echo: AtomicBool,
    stalled: AtomicBool,
}

impl MockTransport {
    /// Creates a transport that reports itself connected.
    pub(crate) fn connected() -> Self {
        let (state, _) = watch::channel(ConnectionState::Connected);
        Self {
            sent: Mutex::new(Vec::new()),
            replies: Mutex::new(HashMap::new()),
            handler: Mutex::new(None),
            state,
            echo: AtomicBool::new(false),
            stalled: AtomicBool::new(false),
        }
    }

    /// Answers every send of `command` with `lines`.
    pub(crate) fn reply(&self, command: &str, lines: &[&str]) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                command.to_owned(),
                lines.iter().map(|l| (*l).to_owned()).collect(),
            );
    }

    /// Makes the bridge echo every command before replying.
    pub(crate) fn set_echo(&self, echo: bool) {
        self.echo.store(echo, Ordering::SeqCst);
    }

    /// Makes every send record its line and then never complete.
    pub(crate) fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    /// Every line sent so far.
    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of times `command` was sent.
    pub(crate) fn sent_count(&self, command: &str) -> usize {
        self.sent().iter().filter(|l| *l == command).count()
    }

    /// Delivers a line as if the bridge had sent it.
    pub(crate) async fn inject(&self, line: &str) {
        let handler = self
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(handler) = handler {
            handler(line.to_owned()).await;
        }
    }
}

impl Transport for MockTransport {
    fn start(&self, on_line: LineHandler) -> BoxFuture<'_, Result<()>> {
        *self.handler.lock().unwrap_or_else(PoisonError::into_inner) = Some(on_line);
        async { Ok(()) }.boxed()
    }

    fn stop(&self) -> BoxFuture<'_, ()> {
        self.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.set_state(ConnectionState::Stopped);
        async {}.boxed()
    }

    fn send<'a>(&'a self, line: &'a str) -> BoxFuture<'a, ()> {
        async move {
            if !self.is_connected() {
                return;
            }
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(line.to_owned());
            if self.stalled.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.echo.load(Ordering::SeqCst) {
                self.inject(line).await;
            }
            let replies = self
                .replies
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(line)
                .cloned()
                .unwrap_or_default();
            for reply in replies {
                self.inject(&reply).await;
            }
        }
        .boxed()
    }

    fn is_connected(&self) -> bool {
        *self.state.borrow() == ConnectionState::Connected
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }
}
