//! Change notification for the device table.
//!
//! Every change batch (one discovery pass, one poll sweep, one push, one
//! successful refresh) is published exactly once as a point-in-time
//! snapshot. Subscribers either register a callback or hold a
//! [`Subscription`] and pull snapshots asynchronously.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;

use crate::types::DeviceTable;

/// Callback invoked with each published snapshot.
pub type ChangeHandler = Arc<dyn Fn(Arc<DeviceTable>) + Send + Sync>;

/// Handle returned by [`ChangeNotifier::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

/// A pull-style subscription to snapshots.
pub struct Subscription {
    receiver: broadcast::Receiver<Arc<DeviceTable>>,
}

impl Subscription {
    /// Receives the next snapshot.
    ///
    /// Snapshots missed by a slow receiver are skipped; only the newer ones
    /// are returned. Returns `None` once the notifier is dropped.
    pub async fn recv(&mut self) -> Option<Arc<DeviceTable>> {
        loop {
            match self.receiver.recv().await {
                Ok(snapshot) => return Some(snapshot),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::trace!("subscription lagged by {} snapshots", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Publishes device table snapshots to subscribers.
pub struct ChangeNotifier {
    handlers: Mutex<Vec<(SubscriptionToken, ChangeHandler)>>,
    next_token: AtomicU64,
    sender: broadcast::Sender<Arc<DeviceTable>>,
}

impl ChangeNotifier {
    /// Creates a notifier whose pull subscriptions buffer `capacity` snapshots.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            handlers: Mutex::new(Vec::new()),
            next_token: AtomicU64::new(1),
            sender,
        }
    }

    fn handlers(&self) -> MutexGuard<'_, Vec<(SubscriptionToken, ChangeHandler)>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a callback for every future snapshot.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionToken
    where
        F: Fn(Arc<DeviceTable>) + Send + Sync + 'static,
    {
        let token = SubscriptionToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.handlers().push((token, Arc::new(handler)));
        token
    }

    /// Removes a callback. Returns false if the token was not registered.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut handlers = self.handlers();
        let before = handlers.len();
        handlers.retain(|(t, _)| *t != token);
        handlers.len() != before
    }

    /// Opens a pull-style subscription.
    #[must_use]
    pub fn watch(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Delivers `snapshot` to every callback and subscription.
    pub fn publish(&self, snapshot: Arc<DeviceTable>) {
        // Callbacks may unsubscribe themselves, so run them unlocked.
        let handlers: Vec<ChangeHandler> =
            self.handlers().iter().map(|(_, h)| Arc::clone(h)).collect();
        tracing::trace!(
            "publishing {} devices to {} handlers",
            snapshot.len(),
            handlers.len()
        );
        for handler in handlers {
            handler(Arc::clone(&snapshot));
        }
        // No receivers is fine
        let _ = self.sender.send(snapshot);
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(16)
    }
}
