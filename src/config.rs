//! Coordinator configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::protocol::MAX_POINTS;
use crate::transport::TcpConfig;

/// Default interval between status sweeps.
pub const DEFAULT_STATUS_POLL: Duration = Duration::from_secs(300);

/// Default interval between battery sweeps.
pub const DEFAULT_BATTERY_POLL: Duration = Duration::from_secs(180 * 60);

/// Default wait between the first connect and discovery.
pub const DEFAULT_DISCOVERY_DELAY: Duration = Duration::from_secs(2);

/// Default wait between a shade command and its status re-read.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(400);

const NAME_PREFIX: &str = "device_name_";
const AREA_PREFIX: &str = "device_area_";

/// Name and area to use for one point instead of the derived ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceOverride {
    /// Display name.
    pub name: Option<String>,
    /// Area the device belongs to.
    pub area: Option<String>,
}

/// Per-point overrides keyed by point index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceOverrides(BTreeMap<u8, DeviceOverride>);

impl DeviceOverrides {
    /// Creates an empty set of overrides.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builds overrides from flat `device_name_NNN` / `device_area_NNN`
    /// options. Blank values and unrelated keys are ignored.
    pub fn from_options<I, K, V>(options: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut overrides = Self::new();
        for (key, value) in options {
            let (key, value) = (key.as_ref(), value.as_ref().trim());
            if value.is_empty() {
                continue;
            }
            if let Some(index) = key.strip_prefix(NAME_PREFIX).and_then(parse_index) {
                overrides.entry(index).name = Some(value.to_owned());
            } else if let Some(index) = key.strip_prefix(AREA_PREFIX).and_then(parse_index) {
                overrides.entry(index).area = Some(value.to_owned());
            }
        }
        overrides
    }

    fn entry(&mut self, index: u8) -> &mut DeviceOverride {
        self.0.entry(index).or_default()
    }

    /// Sets the display name for a point.
    #[must_use]
    pub fn name(mut self, index: u8, name: impl Into<String>) -> Self {
        self.entry(index).name = Some(name.into());
        self
    }

    /// Sets the area for a point.
    #[must_use]
    pub fn area(mut self, index: u8, area: impl Into<String>) -> Self {
        self.entry(index).area = Some(area.into());
        self
    }

    /// Returns the override for a point, if any.
    #[must_use]
    pub fn get(&self, index: u8) -> Option<&DeviceOverride> {
        self.0.get(&index)
    }

    /// Override name for a point.
    #[must_use]
    pub fn name_for(&self, index: u8) -> Option<&str> {
        self.get(index).and_then(|o| o.name.as_deref())
    }

    /// Override area for a point.
    #[must_use]
    pub fn area_for(&self, index: u8) -> Option<&str> {
        self.get(index).and_then(|o| o.area.as_deref())
    }

    /// Returns true if no point has an override.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn parse_index(digits: &str) -> Option<u8> {
    if digits.len() != 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits
        .parse()
        .ok()
        .filter(|i| (1..=MAX_POINTS).contains(i))
}

/// Configuration for a [`Coordinator`](crate::Coordinator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Connection settings.
    pub tcp: TcpConfig,
    /// Interval between status sweeps; zero disables them.
    pub status_poll: Duration,
    /// Interval between battery sweeps; zero disables them.
    pub battery_poll: Duration,
    /// Probe every index during discovery regardless of the point count.
    pub scan_all: bool,
    /// Wait between the first connect and discovery.
    pub discovery_delay: Duration,
    /// Per-attempt query timeout.
    pub query_timeout: Duration,
    /// Wait between a shade command and its status re-read.
    pub settle_delay: Duration,
    /// Per-point name and area overrides.
    pub overrides: DeviceOverrides,
}

impl BridgeConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self::with_tcp(TcpConfig::new(host))
    }

    /// Creates a configuration around existing connection settings.
    #[must_use]
    pub fn with_tcp(tcp: TcpConfig) -> Self {
        Self {
            tcp,
            status_poll: DEFAULT_STATUS_POLL,
            battery_poll: DEFAULT_BATTERY_POLL,
            scan_all: false,
            discovery_delay: DEFAULT_DISCOVERY_DELAY,
            query_timeout: crate::commands::DEFAULT_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
            overrides: DeviceOverrides::new(),
        }
    }

    /// Sets the port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.tcp = self.tcp.port(port);
        self
    }

    /// Sets the reconnect delay bounds.
    #[must_use]
    pub fn reconnect(mut self, min: Duration, max: Duration) -> Self {
        self.tcp = self.tcp.reconnect(min, max);
        self
    }

    /// Sets the status sweep interval.
    #[must_use]
    pub const fn status_poll(mut self, interval: Duration) -> Self {
        self.status_poll = interval;
        self
    }

    /// Sets the battery sweep interval.
    #[must_use]
    pub const fn battery_poll(mut self, interval: Duration) -> Self {
        self.battery_poll = interval;
        self
    }

    /// Probes all indices during discovery.
    #[must_use]
    pub const fn scan_all(mut self, scan_all: bool) -> Self {
        self.scan_all = scan_all;
        self
    }

    /// Sets the discovery delay.
    #[must_use]
    pub const fn discovery_delay(mut self, delay: Duration) -> Self {
        self.discovery_delay = delay;
        self
    }

    /// Sets the per-attempt query timeout.
    #[must_use]
    pub const fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Sets the shade settle delay.
    #[must_use]
    pub const fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Sets the per-point overrides.
    #[must_use]
    pub fn overrides(mut self, overrides: DeviceOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}
