//! Periodic status and battery sweeps.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

use crate::protocol::{Command, parse_battery, parse_status};
use crate::transport::Transport;
use crate::types::DeviceRecord;

use super::Shared;

impl<T: Transport + 'static> Shared<T> {
    pub(super) async fn run_status_poll(self: Arc<Self>, period: Duration) {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.poll_status().await;
        }
    }

    pub(super) async fn run_battery_poll(self: Arc<Self>, period: Duration) {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.poll_battery().await;
        }
    }

    /// Re-reads the status of every known point, then publishes once.
    pub(super) async fn poll_status(&self) {
        self.sweep("status", Command::PointStatus, |record, reply| {
            if let Some(status) = parse_status(reply) {
                record.status = Some(status);
            }
        })
        .await;
    }

    /// Re-reads the battery of every known point, then publishes once.
    pub(super) async fn poll_battery(&self) {
        self.sweep("battery", Command::PointBatteryGet, |record, reply| {
            if let Some(battery) = parse_battery(reply) {
                record.battery = Some(battery);
            }
        })
        .await;
    }

    async fn sweep(
        &self,
        what: &str,
        command: fn(u8) -> Command,
        apply: fn(&mut DeviceRecord, &str),
    ) {
        if !self.transport.is_connected() {
            tracing::trace!("skipping {} poll: not connected", what);
            return;
        }
        let indices: Vec<u8> = self.devices.read().await.keys().copied().collect();
        if indices.is_empty() {
            return;
        }

        for index in indices {
            match self.ask(command(index)).await {
                Ok(reply) => {
                    self.update(index, |record| apply(record, &reply)).await;
                }
                Err(e) => tracing::debug!("polling {} for point {:03} failed: {}", what, index, e),
            }
        }
        self.publish().await;
    }
}
