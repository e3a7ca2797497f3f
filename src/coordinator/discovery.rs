//! Startup discovery of the bridge's points.

use std::sync::Arc;

use crate::error::Result;
use crate::protocol::{
    Command, MAX_POINTS, parse_battery, parse_device_type, parse_point_count, parse_point_id,
    parse_status,
};
use crate::registry::RegistryUpdate;
use crate::transport::{ConnectionState, Transport};
use crate::types::DeviceRecord;

use super::Shared;

impl<T: Transport + 'static> Shared<T> {
    /// Waits for the first connect, then the discovery delay, then discovers.
    pub(super) async fn run_discovery(self: Arc<Self>) {
        let mut state = self.transport.connection_state();
        let stopped = match state
            .wait_for(|s| matches!(s, ConnectionState::Connected | ConnectionState::Stopped))
            .await
        {
            Ok(s) => *s == ConnectionState::Stopped,
            Err(_) => true,
        };
        if stopped {
            return;
        }

        tokio::time::sleep(self.config.discovery_delay).await;
        if !self.transport.is_connected() {
            tracing::debug!("not connected after discovery delay; skipping discovery");
            return;
        }
        self.discover().await;
    }

    /// Probes every point in range and replaces their records.
    pub(super) async fn discover(&self) {
        let count = match self.ask(Command::PointCount).await {
            Ok(reply) => parse_point_count(&reply),
            Err(e) if e.is_timeout() => {
                tracing::warn!("timeout on ?POINTCOUNT; scanning all points");
                0
            }
            Err(e) => {
                tracing::warn!("discovery aborted: {}", e);
                return;
            }
        };

        let last = if self.config.scan_all || count == 0 {
            MAX_POINTS
        } else {
            u8::try_from(count).map_or(MAX_POINTS, |c| c.min(MAX_POINTS))
        };
        tracing::debug!(
            "discovery scanning points 1..={} (POINTCOUNT={}, scan_all={})",
            last,
            count,
            self.config.scan_all
        );

        let mut found = 0usize;
        for index in 1..=last {
            match self.probe(index).await {
                Ok(record) => {
                    tracing::debug!(
                        "discovered point {:03}: type={:?} id={:?} status={:?}",
                        index,
                        record.device_type,
                        record.point_id,
                        record.status_hex()
                    );
                    self.devices.write().await.insert(index, record);
                    found += 1;
                }
                Err(e) => tracing::debug!("skipping point {:03}: {}", index, e),
            }
        }
        tracing::info!("discovery found {} of {} points", found, last);

        self.publish().await;
        self.apply_overrides().await;
    }

    /// Reads type, id, and status of one point, then its battery.
    ///
    /// # Errors
    ///
    /// Fails if any of the first three queries fails. A failed battery read
    /// leaves the battery unknown.
    async fn probe(&self, index: u8) -> Result<DeviceRecord> {
        let device_type = self.ask(Command::PointDevice(index)).await?;
        let point_id = self.ask(Command::PointId(index)).await?;
        let status = self.ask(Command::PointStatus(index)).await?;

        let battery = match self.ask(Command::PointBatteryGet(index)).await {
            Ok(reply) => parse_battery(&reply),
            Err(e) => {
                tracing::debug!("battery read for point {:03} failed: {}", index, e);
                None
            }
        };

        Ok(DeviceRecord::new(
            index,
            parse_point_id(&point_id),
            parse_device_type(&device_type),
            parse_status(&status),
            battery,
        ))
    }

    /// Sends each known device's name and area to the registry.
    async fn apply_overrides(&self) {
        let Some(registry) = self.registry() else {
            return;
        };
        let devices = self.devices.read().await;
        for (&index, record) in devices.iter() {
            registry.apply(RegistryUpdate {
                identifier: self.identifier(index, Some(record)),
                name: self.display_name(index, Some(record)),
                area: self.config.overrides.area_for(index).map(str::to_owned),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::super::tests::{config, started};
    use super::*;
    use crate::types::HexByte;

    #[tokio::test]
    async fn test_discover_with_count() {
        let (coordinator, transport) = started(config()).await;
        transport.reply("?POINTCOUNT", &["POINTCOUNT=2"]);
        transport.reply("?POINTDEVICE-001", &["POINTDEVICE-001,$01"]);
        transport.reply("?POINTID-001", &["POINTID-001,08123456"]);
        transport.reply("?POINTSTATUS-001", &["$00"]);
        transport.reply("?POINTBATTERYGET-001", &["$64"]);
        transport.reply("?POINTDEVICE-002", &["$13"]);
        transport.reply("?POINTID-002", &["98ABCDEF"]);
        transport.reply("?POINTSTATUS-002", &["1E"]);
        transport.reply("?POINTBATTERYGET-002", &["POINTBATTERYGET-002,$5A"]);

        let publishes = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&publishes);
        coordinator.subscribe(move |snapshot| {
            assert_eq!(snapshot.len(), 2);
            seen.fetch_add(1, Ordering::SeqCst);
        });

        coordinator.discover().await;

        let devices = coordinator.devices().await;
        assert_eq!(devices.len(), 2);
        let shade = &devices[&2];
        assert_eq!(shade.name, "Pella Shade (98ABCDEF)");
        assert_eq!(shade.model(), "Shade/Blind");
        assert_eq!(shade.status_hex().as_deref(), Some("1E"));
        assert_eq!(shade.battery_hex().as_deref(), Some("$5A"));
        assert_eq!(devices[&1].name, "Pella Open/Close (08123456)");
        assert_eq!(publishes.load(Ordering::SeqCst), 1);
        assert_eq!(transport.sent_count("?POINTDEVICE-003"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_count_timeout_scans_full_range() {
        let (coordinator, transport) = started(config()).await;

        coordinator.discover().await;

        assert_eq!(transport.sent_count("?POINTCOUNT"), 2);
        assert_eq!(transport.sent_count("?POINTDEVICE-001"), 2);
        assert_eq!(transport.sent_count("?POINTDEVICE-128"), 2);
        assert_eq!(transport.sent_count("?POINTID-001"), 0);
        assert!(coordinator.devices().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_count_scans_full_range() {
        let (coordinator, transport) = started(config()).await;
        transport.reply("?POINTCOUNT", &["0"]);

        coordinator.discover().await;

        assert_eq!(transport.sent_count("?POINTDEVICE-128"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_all_ignores_count() {
        let (coordinator, transport) = started(config().scan_all(true)).await;
        transport.reply("?POINTCOUNT", &["1"]);

        coordinator.discover().await;

        assert_eq!(transport.sent_count("?POINTDEVICE-128"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_battery_failure_is_tolerated() {
        let (coordinator, transport) = started(config()).await;
        transport.reply("?POINTCOUNT", &["1"]);
        transport.reply("?POINTDEVICE-001", &["$0D"]);
        transport.reply("?POINTID-001", &["68000001"]);
        transport.reply("?POINTSTATUS-001", &["$06"]);

        coordinator.discover().await;

        let device = coordinator.device(1).await.unwrap();
        assert_eq!(device.battery, None);
        assert_eq!(device.status, Some(HexByte::new(0x06)));
        assert_eq!(device.is_unlocked(), Some(true));
        assert_eq!(device.is_tampered(), Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_point_is_skipped() {
        let (coordinator, transport) = started(config()).await;
        transport.reply("?POINTCOUNT", &["2"]);
        transport.reply("?POINTDEVICE-001", &["$01"]);
        transport.reply("?POINTID-001", &["08000001"]);
        transport.reply("?POINTDEVICE-002", &["$01"]);
        transport.reply("?POINTID-002", &["08000002"]);
        transport.reply("?POINTSTATUS-002", &["$00"]);
        transport.reply("?POINTBATTERYGET-002", &["$40"]);

        coordinator.discover().await;

        let devices = coordinator.devices().await;
        assert!(!devices.contains_key(&1));
        assert!(devices.contains_key(&2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unparsed_type_still_creates_point() {
        let (coordinator, transport) = started(config()).await;
        transport.reply("?POINTCOUNT", &["1"]);
        transport.reply("?POINTDEVICE-001", &["?ERR"]);
        transport.reply("?POINTID-001", &["?ERR"]);
        transport.reply("?POINTSTATUS-001", &["??"]);
        transport.reply("?POINTBATTERYGET-001", &["?"]);

        coordinator.discover().await;

        let device = coordinator.device(1).await.unwrap();
        assert_eq!(device.name, "Pella Device (001)");
        assert_eq!(device.model(), "Insynctive Device");
        assert_eq!(device.status, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_after_first_connect() {
        let (coordinator, transport) = started(config()).await;
        transport.set_state(ConnectionState::Connecting);
        transport.reply("?POINTCOUNT", &["1"]);
        transport.reply("?POINTDEVICE-001", &["$13"]);
        transport.reply("?POINTID-001", &["98000001"]);
        transport.reply("?POINTSTATUS-001", &["$00"]);
        transport.reply("?POINTBATTERYGET-001", &["$64"]);

        let task = tokio::spawn(Arc::clone(&coordinator.shared).run_discovery());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(transport.sent().is_empty());

        transport.set_state(ConnectionState::Connected);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(transport.sent().is_empty());

        task.await.unwrap();
        assert!(coordinator.device(1).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborts_if_disconnected_after_delay() {
        let (coordinator, transport) = started(config()).await;

        let task = tokio::spawn(Arc::clone(&coordinator.shared).run_discovery());
        tokio::time::sleep(Duration::from_secs(1)).await;
        transport.set_state(ConnectionState::Disconnected);

        task.await.unwrap();
        assert!(transport.sent().is_empty());
    }
}
