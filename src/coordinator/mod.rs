//! Main [`Coordinator`] implementation.
//!
//! The coordinator combines the transport, query correlation, and change
//! notification into one handle that owns the device table. It classifies
//! every inbound line, runs discovery once after the first connect, keeps
//! the table fresh with periodic sweeps, and drives shades.

mod discovery;
mod poll;

use std::sync::{Arc, PoisonError, RwLock as StdRwLock};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::commands::{CommandHandler, LineDisposition};
use crate::config::BridgeConfig;
use crate::error::Result;
use crate::event::{ChangeNotifier, Subscription, SubscriptionToken};
use crate::protocol::{
    Command, PushStatus, SHADE_STOP, parse_battery, parse_push, parse_status, point_index,
};
use crate::registry::DeviceRegistry;
use crate::transport::{LineHandler, TcpLineTransport, Transport};
use crate::types::{DeviceRecord, DeviceTable, default_name, shade};

/// Coordinator for one Insynctive bridge.
pub struct Coordinator<T> {
    shared: Arc<Shared<T>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// State reachable from background tasks and the line handler.
struct Shared<T> {
    config: BridgeConfig,
    transport: Arc<T>,
    commands: CommandHandler<T>,
    devices: RwLock<DeviceTable>,
    notifier: ChangeNotifier,
    registry: StdRwLock<Option<Arc<dyn DeviceRegistry>>>,
}

impl Coordinator<TcpLineTransport> {
    /// Creates a coordinator that talks to the bridge over TCP.
    ///
    /// Nothing connects until [`start`](Self::start) is called.
    #[must_use]
    pub fn tcp(config: BridgeConfig) -> Self {
        let transport = TcpLineTransport::new(config.tcp.clone());
        Self::with_transport(config, transport)
    }
}

impl<T: Transport + 'static> Coordinator<T> {
    /// Creates a coordinator over the given transport.
    #[must_use]
    pub fn with_transport(config: BridgeConfig, transport: T) -> Self {
        Self::with_shared_transport(config, Arc::new(transport))
    }

    pub(crate) fn with_shared_transport(config: BridgeConfig, transport: Arc<T>) -> Self {
        let commands = CommandHandler::new(Arc::clone(&transport));
        Self {
            shared: Arc::new(Shared {
                config,
                transport,
                commands,
                devices: RwLock::new(DeviceTable::new()),
                notifier: ChangeNotifier::default(),
                registry: StdRwLock::new(None),
            }),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Sets the registry that receives name/area updates after discovery.
    #[must_use]
    pub fn with_registry(self, registry: impl DeviceRegistry + 'static) -> Self {
        *self
            .shared
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(registry));
        self
    }

    /// Starts the transport, discovery, and the poll timers.
    ///
    /// Discovery runs once, [`discovery_delay`](BridgeConfig::discovery_delay)
    /// after the transport first reports connected. Calling `start` again
    /// while running does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be started.
    pub async fn start(&self) -> Result<()> {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            return Ok(());
        }

        self.shared
            .transport
            .start(Shared::line_handler(&self.shared))
            .await?;

        let config = &self.shared.config;
        tasks.push(tokio::spawn(Arc::clone(&self.shared).run_discovery()));
        if config.status_poll.is_zero() {
            tracing::debug!("status polling disabled");
        } else {
            tasks.push(tokio::spawn(
                Arc::clone(&self.shared).run_status_poll(config.status_poll),
            ));
        }
        if config.battery_poll.is_zero() {
            tracing::debug!("battery polling disabled");
        } else {
            tasks.push(tokio::spawn(
                Arc::clone(&self.shared).run_battery_poll(config.battery_poll),
            ));
        }

        tracing::info!("coordinator started for {}", self.bridge_id());
        Ok(())
    }

    /// Stops timers and the transport, then discards the device table.
    ///
    /// No line is handled and nothing is published after this returns.
    pub async fn stop(&self) {
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::warn!("coordinator task failed: {}", e);
                }
            }
        }
        self.shared.transport.stop().await;
        self.shared.devices.write().await.clear();
        tracing::info!("coordinator stopped for {}", self.bridge_id());
    }

    /// Sends a raw query and returns its reply line.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotConnected` or `Error::Timeout`.
    pub async fn query(&self, command: &str, timeout: Duration) -> Result<String> {
        self.shared.commands.query(command, timeout).await
    }

    /// Sends a raw command without waiting for a reply.
    pub async fn send_only(&self, command: &str) {
        self.shared.commands.send_only(command).await;
    }

    /// Classifies and applies one inbound line.
    pub async fn handle_line(&self, line: &str) {
        self.shared.handle_line(line).await;
    }

    /// Runs a full discovery pass now.
    pub async fn discover(&self) {
        self.shared.discover().await;
    }

    /// Re-reads the status of every known point.
    pub async fn poll_status(&self) {
        self.shared.poll_status().await;
    }

    /// Re-reads the battery of every known point.
    pub async fn poll_battery(&self) {
        self.shared.poll_battery().await;
    }

    /// Re-reads one point's status and publishes on success.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidIndex`, `Error::NotConnected`, or `Error::Timeout`.
    pub async fn refresh_status(&self, index: u32) -> Result<()> {
        self.shared.refresh_status(point_index(index)?).await
    }

    /// Re-reads one point's battery and publishes on success.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidIndex`, `Error::NotConnected`, or `Error::Timeout`.
    pub async fn refresh_battery(&self, index: u32) -> Result<()> {
        self.shared.refresh_battery(point_index(index)?).await
    }

    /// Moves a shade to `percent` open (clamped to 0-100).
    ///
    /// The status is re-read after the settle delay; a failed re-read is
    /// logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidIndex` if `index` is outside 1-128.
    pub async fn set_shade_position(&self, index: u32, percent: i32) -> Result<()> {
        self.shared
            .set_shade_position(point_index(index)?, percent)
            .await;
        Ok(())
    }

    /// Opens a shade fully.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidIndex` if `index` is outside 1-128.
    pub async fn open_shade(&self, index: u32) -> Result<()> {
        self.set_shade_position(index, 100).await
    }

    /// Closes a shade fully.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidIndex` if `index` is outside 1-128.
    pub async fn close_shade(&self, index: u32) -> Result<()> {
        self.set_shade_position(index, 0).await
    }

    /// Halts a moving shade. No status is re-read.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidIndex` if `index` is outside 1-128.
    pub async fn stop_shade(&self, index: u32) -> Result<()> {
        let index = point_index(index)?;
        self.shared
            .send(Command::PointSet {
                index,
                value: SHADE_STOP,
            })
            .await;
        Ok(())
    }

    /// Returns a snapshot of the device table.
    pub async fn devices(&self) -> DeviceTable {
        self.shared.devices.read().await.clone()
    }

    /// Returns one device record.
    pub async fn device(&self, index: u8) -> Option<DeviceRecord> {
        self.shared.devices.read().await.get(&index).cloned()
    }

    /// Registers a callback for every published snapshot.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionToken
    where
        F: Fn(Arc<DeviceTable>) + Send + Sync + 'static,
    {
        self.shared.notifier.subscribe(handler)
    }

    /// Removes a callback registered with [`subscribe`](Self::subscribe).
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.shared.notifier.unsubscribe(token)
    }

    /// Opens a pull-style subscription to published snapshots.
    #[must_use]
    pub fn watch(&self) -> Subscription {
        self.shared.notifier.watch()
    }

    /// Returns true if the transport is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.transport.is_connected()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.shared.config
    }

    /// Stable bridge identifier, `bridge_<host>_<port>`.
    #[must_use]
    pub fn bridge_id(&self) -> String {
        self.shared.bridge_id()
    }

    /// Bridge display name.
    #[must_use]
    pub fn bridge_name(&self) -> String {
        format!("Pella Insynctive ({})", self.shared.config.tcp.host)
    }

    /// Stable identifier of a point, `<bridge id>_<point key>`.
    pub async fn device_identifier(&self, index: u8) -> String {
        let devices = self.shared.devices.read().await;
        self.shared.identifier(index, devices.get(&index))
    }

    /// Display name of a point: the configured override, or the derived name.
    pub async fn display_name(&self, index: u8) -> String {
        let devices = self.shared.devices.read().await;
        self.shared.display_name(index, devices.get(&index))
    }
}

impl<T> Drop for Coordinator<T> {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

impl<T: Transport + 'static> Shared<T> {
    /// Line callback for the transport. Holds only a weak reference so the
    /// transport does not keep the coordinator alive.
    fn line_handler(shared: &Arc<Self>) -> LineHandler {
        let weak = Arc::downgrade(shared);
        Arc::new(move |line: String| {
            let weak = weak.clone();
            async move {
                if let Some(shared) = weak.upgrade() {
                    shared.handle_line(&line).await;
                }
            }
            .boxed()
        })
    }

    fn bridge_id(&self) -> String {
        format!("bridge_{}_{}", self.config.tcp.host, self.config.tcp.port)
    }

    fn identifier(&self, index: u8, record: Option<&DeviceRecord>) -> String {
        let point_key = record.map_or_else(|| format!("point_{index:03}"), DeviceRecord::point_key);
        format!("{}_{}", self.bridge_id(), point_key)
    }

    fn display_name(&self, index: u8, record: Option<&DeviceRecord>) -> String {
        if let Some(name) = self.config.overrides.name_for(index) {
            return name.to_owned();
        }
        record.map_or_else(|| default_name(None, index, None), |r| r.name.clone())
    }

    fn registry(&self) -> Option<Arc<dyn DeviceRegistry>> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn ask(&self, command: Command) -> Result<String> {
        debug_assert!(command.is_query(), "{command} expects no reply");
        self.commands
            .query(&command.to_string(), self.config.query_timeout)
            .await
    }

    async fn send(&self, command: Command) {
        debug_assert!(!command.is_query(), "{command} expects a reply");
        self.commands.send_only(&command.to_string()).await;
    }

    async fn publish(&self) {
        let snapshot = Arc::new(self.devices.read().await.clone());
        self.notifier.publish(snapshot);
    }

    async fn handle_line(&self, line: &str) {
        if let Some(push) = parse_push(line) {
            self.apply_push(push).await;
            return;
        }
        match self.commands.offer(line) {
            LineDisposition::Echo => tracing::trace!("ignoring echo: {}", line),
            LineDisposition::Reply => {}
            LineDisposition::Unsolicited => tracing::debug!("ignoring unsolicited line: {}", line),
        }
    }

    async fn apply_push(&self, push: PushStatus) {
        let Ok(index) = point_index(u32::from(push.index)) else {
            tracing::debug!("ignoring status push for invalid point {:03}", push.index);
            return;
        };
        {
            let mut devices = self.devices.write().await;
            devices
                .entry(index)
                .and_modify(|d| d.status = Some(push.status))
                .or_insert_with(|| DeviceRecord::from_push(index, push.status));
        }
        tracing::debug!("point {:03} pushed status {}", index, push.status);
        self.publish().await;
    }

    async fn refresh_status(&self, index: u8) -> Result<()> {
        let reply = self.ask(Command::PointStatus(index)).await?;
        if let Some(status) = parse_status(&reply) {
            if self.update(index, |d| d.status = Some(status)).await {
                self.publish().await;
            }
        }
        Ok(())
    }

    async fn refresh_battery(&self, index: u8) -> Result<()> {
        let reply = self.ask(Command::PointBatteryGet(index)).await?;
        if let Some(battery) = parse_battery(&reply) {
            if self.update(index, |d| d.battery = Some(battery)).await {
                self.publish().await;
            }
        }
        Ok(())
    }

    /// Applies `f` to a known record. Returns false if the index is unknown.
    async fn update(&self, index: u8, f: impl FnOnce(&mut DeviceRecord)) -> bool {
        self.devices.write().await.get_mut(&index).map(f).is_some()
    }

    async fn set_shade_position(&self, index: u8, percent: i32) {
        let value = shade::position_to_native(percent);
        self.send(Command::PointSet { index, value }).await;
        tokio::time::sleep(self.config.settle_delay).await;
        if let Err(e) = self.refresh_status(index).await {
            tracing::debug!("status re-read for shade {:03} failed: {}", index, e);
        }
    }
}
