//! Device records and derived naming.

use std::collections::BTreeMap;

use crate::types::HexByte;
use crate::types::shade;

/// Snapshot of every known point, keyed by index.
pub type DeviceTable = BTreeMap<u8, DeviceRecord>;

/// Name label for points of unknown kind.
pub const DEFAULT_LABEL: &str = "Pella Device";

/// Model string for points of unknown kind.
pub const DEFAULT_MODEL: &str = "Insynctive Device";

/// Status bytes reporting an open contact.
const OPEN_STATUSES: [u8; 2] = [0x01, 0x05];

/// Status bytes reporting an unlocked lock.
const UNLOCKED_STATUSES: [u8; 2] = [0x02, 0x06];

/// Status bytes reporting the sensor cover removed.
const TAMPER_STATUSES: [u8; 3] = [0x04, 0x05, 0x06];

/// Kinds of points the bridge manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// Window or door open/close sensor.
    WindowDoor,
    /// Garage door sensor.
    Garage,
    /// Door lock sensor.
    Lock,
    /// Motorized shade or blind.
    Shade,
}

struct KindInfo {
    kind: DeviceKind,
    type_code: u8,
    id_prefix: &'static str,
    label: &'static str,
    model: &'static str,
}

static KINDS: [KindInfo; 4] = [
    KindInfo {
        kind: DeviceKind::WindowDoor,
        type_code: 0x01,
        id_prefix: "08",
        label: "Pella Open/Close",
        model: "Open/Close Sensor",
    },
    KindInfo {
        kind: DeviceKind::Garage,
        type_code: 0x03,
        id_prefix: "18",
        label: "Pella Garage Door",
        model: "Garage Door Sensor",
    },
    KindInfo {
        kind: DeviceKind::Lock,
        type_code: 0x0D,
        id_prefix: "68",
        label: "Pella Lock",
        model: "Door Lock Sensor",
    },
    KindInfo {
        kind: DeviceKind::Shade,
        type_code: 0x13,
        id_prefix: "98",
        label: "Pella Shade",
        model: "Shade/Blind",
    },
];

impl DeviceKind {
    fn info(self) -> &'static KindInfo {
        // KINDS holds one entry per variant, in declaration order
        &KINDS[self as usize]
    }

    /// Looks up a kind by its `?POINTDEVICE` type code.
    #[must_use]
    pub fn from_type_code(code: u8) -> Option<Self> {
        KINDS.iter().find(|k| k.type_code == code).map(|k| k.kind)
    }

    /// Looks up a kind by the first two characters of a point id.
    #[must_use]
    pub fn from_point_id(point_id: &str) -> Option<Self> {
        let prefix = point_id.get(..2)?;
        KINDS.iter().find(|k| k.id_prefix == prefix).map(|k| k.kind)
    }

    /// The `?POINTDEVICE` type code.
    #[must_use]
    pub fn type_code(self) -> u8 {
        self.info().type_code
    }

    /// Label used in default display names.
    #[must_use]
    pub fn label(self) -> &'static str {
        self.info().label
    }

    /// Model description.
    #[must_use]
    pub fn model(self) -> &'static str {
        self.info().model
    }
}

/// Derives the default display name, e.g. `Pella Shade (S083C57)`.
///
/// The point id is preferred as suffix; the 3-digit index stands in when
/// the id is unknown.
#[must_use]
pub fn default_name(device_type: Option<u8>, index: u8, point_id: Option<&str>) -> String {
    let label = device_type
        .and_then(DeviceKind::from_type_code)
        .map_or(DEFAULT_LABEL, DeviceKind::label);
    match point_id {
        Some(id) => format!("{label} ({id})"),
        None => format!("{label} ({index:03})"),
    }
}

/// One addressable point on the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Slot address (1-128), stable for the life of the record.
    pub index: u8,
    /// Serial number reported by `?POINTID`.
    pub point_id: Option<String>,
    /// Type code reported by `?POINTDEVICE`.
    pub device_type: Option<u8>,
    /// Derived display name.
    pub name: String,
    /// Raw status byte.
    pub status: Option<HexByte>,
    /// Raw battery byte.
    pub battery: Option<HexByte>,
}

impl DeviceRecord {
    /// Creates a record with its default name derived from type and id.
    #[must_use]
    pub fn new(
        index: u8,
        point_id: Option<String>,
        device_type: Option<u8>,
        status: Option<HexByte>,
        battery: Option<HexByte>,
    ) -> Self {
        let name = default_name(device_type, index, point_id.as_deref());
        Self {
            index,
            point_id,
            device_type,
            name,
            status,
            battery,
        }
    }

    /// Creates a record for a point first seen through a status push.
    #[must_use]
    pub fn from_push(index: u8, status: HexByte) -> Self {
        Self::new(index, None, None, Some(status), None)
    }

    /// Kind derived from the device type code.
    #[must_use]
    pub fn kind(&self) -> Option<DeviceKind> {
        self.device_type.and_then(DeviceKind::from_type_code)
    }

    /// Model description.
    ///
    /// The point id serial prefix wins over the device type code.
    #[must_use]
    pub fn model(&self) -> &'static str {
        self.point_id
            .as_deref()
            .and_then(DeviceKind::from_point_id)
            .or_else(|| self.kind())
            .map_or(DEFAULT_MODEL, DeviceKind::model)
    }

    /// Status as two uppercase hex digits, e.g. `0A`.
    #[must_use]
    pub fn status_hex(&self) -> Option<String> {
        self.status.map(HexByte::to_hex)
    }

    /// Battery in the bridge's `$XX` form.
    #[must_use]
    pub fn battery_hex(&self) -> Option<String> {
        self.battery.map(HexByte::to_dollar_hex)
    }

    /// Key identifying this point within its bridge: the point id, or
    /// `point_III` while the id is unknown.
    #[must_use]
    pub fn point_key(&self) -> String {
        self.point_id
            .clone()
            .unwrap_or_else(|| format!("point_{:03}", self.index))
    }

    /// Contact sensor reports open.
    #[must_use]
    pub fn is_open(&self) -> Option<bool> {
        self.status_in(&OPEN_STATUSES)
    }

    /// Lock sensor reports unlocked.
    #[must_use]
    pub fn is_unlocked(&self) -> Option<bool> {
        self.status_in(&UNLOCKED_STATUSES)
    }

    /// Sensor cover is off.
    #[must_use]
    pub fn is_tampered(&self) -> Option<bool> {
        self.status_in(&TAMPER_STATUSES)
    }

    /// Battery level in percent, clamped to 0-100.
    #[must_use]
    pub fn battery_percent(&self) -> Option<u8> {
        self.battery.map(|b| b.value().min(100))
    }

    /// Shade position in percent, 100 meaning fully open.
    #[must_use]
    pub fn shade_position(&self) -> Option<u8> {
        self.status.map(|s| shade::native_to_position(s.value()))
    }

    fn status_in(&self, set: &[u8]) -> Option<bool> {
        self.status.map(|s| set.contains(&s.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_table_order() {
        for kind in [
            DeviceKind::WindowDoor,
            DeviceKind::Garage,
            DeviceKind::Lock,
            DeviceKind::Shade,
        ] {
            assert_eq!(DeviceKind::from_type_code(kind.type_code()), Some(kind));
        }
    }

    #[test]
    fn test_default_name() {
        assert_eq!(
            default_name(Some(0x13), 3, Some("S083C57")),
            "Pella Shade (S083C57)"
        );
        assert_eq!(default_name(Some(0x01), 4, None), "Pella Open/Close (004)");
        assert_eq!(default_name(Some(0x03), 5, None), "Pella Garage Door (005)");
        assert_eq!(default_name(Some(0x0D), 6, None), "Pella Lock (006)");
        assert_eq!(default_name(Some(0x7F), 7, None), "Pella Device (007)");
        assert_eq!(default_name(None, 12, Some("X1")), "Pella Device (X1)");
    }

    #[test]
    fn test_push_record() {
        let record = DeviceRecord::from_push(7, HexByte::new(0x0A));
        assert_eq!(record.name, "Pella Device (007)");
        assert_eq!(record.status_hex().as_deref(), Some("0A"));
        assert_eq!(record.point_key(), "point_007");
        assert_eq!(record.battery_hex(), None);
    }

    #[test]
    fn test_model_prefers_point_id() {
        let record = DeviceRecord::new(1, Some("9812345".into()), Some(0x01), None, None);
        assert_eq!(record.model(), "Shade/Blind");

        let record = DeviceRecord::new(1, Some("S083C57".into()), Some(0x0D), None, None);
        assert_eq!(record.model(), "Door Lock Sensor");

        let record = DeviceRecord::new(1, None, None, None, None);
        assert_eq!(record.model(), DEFAULT_MODEL);
    }

    #[test]
    fn test_status_helpers() {
        let mut record = DeviceRecord::new(1, None, Some(0x01), None, None);
        assert_eq!(record.is_open(), None);

        record.status = Some(HexByte::new(0x05));
        assert_eq!(record.is_open(), Some(true));
        assert_eq!(record.is_tampered(), Some(true));
        assert_eq!(record.is_unlocked(), Some(false));

        record.status = Some(HexByte::new(0x02));
        assert_eq!(record.is_open(), Some(false));
        assert_eq!(record.is_unlocked(), Some(true));
        assert_eq!(record.is_tampered(), Some(false));
    }

    #[test]
    fn test_battery_percent() {
        let mut record = DeviceRecord::new(10, None, None, None, Some(HexByte::new(0x5A)));
        assert_eq!(record.battery_hex().as_deref(), Some("$5A"));
        assert_eq!(record.battery_percent(), Some(90));

        record.battery = Some(HexByte::new(0xFF));
        assert_eq!(record.battery_percent(), Some(100));
    }

    #[test]
    fn test_shade_position() {
        let mut record = DeviceRecord::new(2, None, Some(0x13), Some(HexByte::new(0)), None);
        assert_eq!(record.shade_position(), Some(100));

        record.status = Some(HexByte::new(0x1E));
        assert_eq!(record.shade_position(), Some(70));
    }
}
