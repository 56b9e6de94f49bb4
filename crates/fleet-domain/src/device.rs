use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DomainError, DomainResult};
use crate::ids::{DeviceGroupId, DeviceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Sensor,
    Gateway,
    Controller,
    Camera,
    Router,
    Switch,
    AccessPoint,
    Actuator,
    Display,
    Unknown,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeviceType::Sensor => "sensor",
            DeviceType::Gateway => "gateway",
            DeviceType::Controller => "controller",
            DeviceType::Camera => "camera",
            DeviceType::Router => "router",
            DeviceType::Switch => "switch",
            DeviceType::AccessPoint => "access_point",
            DeviceType::Actuator => "actuator",
            DeviceType::Display => "display",
            DeviceType::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Online,
    Offline,
    Maintenance,
    Error,
    Provisioning,
    Decommissioned,
    Unknown,
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeviceStatus::Online => "online",
            DeviceStatus::Offline => "offline",
            DeviceStatus::Maintenance => "maintenance",
            DeviceStatus::Error => "error",
            DeviceStatus::Provisioning => "provisioning",
            DeviceStatus::Decommissioned => "decommissioned",
            DeviceStatus::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Physical or logical placement of a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DeviceLocation {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub altitude: Option<f64>,
}

impl DeviceLocation {
    pub fn validate(&self) -> DomainResult<()> {
        if let Some(lat) = self.lat {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(DomainError::OutOfRange {
                    field: "location.lat",
                    message: format!("{lat} not in [-90, 90]"),
                });
            }
        }
        if let Some(lon) = self.lon {
            if !(-180.0..=180.0).contains(&lon) {
                return Err(DomainError::OutOfRange {
                    field: "location.lon",
                    message: format!("{lon} not in [-180, 180]"),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub device_type: DeviceType,
    pub status: DeviceStatus,

    pub ip_address: Option<String>,
    pub mac_address: Option<String>,
    pub port: Option<u16>,

    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,

    pub location: DeviceLocation,

    pub last_seen: Option<DateTime<Utc>>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub uptime_seconds: Option<u64>,

    pub health_score: Option<f64>,
    pub battery_level: Option<f64>,
    pub signal_strength: Option<f64>,

    pub parent_device_id: Option<DeviceId>,
    pub group_id: Option<DeviceGroupId>,

    pub metadata: Value,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Device {
    pub fn new(name: impl Into<String>, device_type: DeviceType) -> Self {
        let now = Utc::now();
        Self {
            id: DeviceId::new(),
            name: name.into(),
            device_type,
            status: DeviceStatus::Unknown,
            ip_address: None,
            mac_address: None,
            port: None,
            manufacturer: None,
            model: None,
            serial_number: None,
            location: DeviceLocation::default(),
            last_seen: None,
            last_heartbeat: None,
            uptime_seconds: None,
            health_score: None,
            battery_level: None,
            signal_strength: None,
            parent_device_id: None,
            group_id: None,
            metadata: Value::Object(Default::default()),
            created_at: now,
            updated_at: now,
            deleted: false,
            deleted_at: None,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        self.location.validate()?;
        if let Some(h) = self.health_score {
            if !(0.0..=1.0).contains(&h) {
                return Err(DomainError::OutOfRange {
                    field: "health_score",
                    message: format!("{h} not in [0.0, 1.0]"),
                });
            }
        }
        if let Some(b) = self.battery_level {
            if !(0.0..=100.0).contains(&b) {
                return Err(DomainError::OutOfRange {
                    field: "battery_level",
                    message: format!("{b} not in [0.0, 100.0]"),
                });
            }
        }
        Ok(())
    }

    /// `is_online` ↔ `status == online`.
    pub fn is_online(&self) -> bool {
        self.status == DeviceStatus::Online
    }

    /// `is_healthy` ↔ status ∈ {online, maintenance} ∧ (health_score unset ∨ ≥ 0.7).
    pub fn is_healthy(&self) -> bool {
        matches!(self.status, DeviceStatus::Online | DeviceStatus::Maintenance)
            && self.health_score.map_or(true, |h| h >= 0.7)
    }

    /// Marks the device as having produced a heartbeat `at`, flipping
    /// offline devices to online per invariant §8.3.
    pub fn record_heartbeat(&mut self, at: DateTime<Utc>) {
        self.last_heartbeat = Some(at);
        self.last_seen = Some(at);
        if self.status == DeviceStatus::Offline || self.status == DeviceStatus::Unknown {
            self.status = DeviceStatus::Online;
        }
        self.updated_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_flips_offline_to_online() {
        let mut d = Device::new("T1", DeviceType::Sensor);
        d.status = DeviceStatus::Offline;
        let before = Utc::now();
        d.record_heartbeat(before);
        assert!(d.is_online());
        assert!(d.last_heartbeat.unwrap() >= before);
    }

    #[test]
    fn healthy_requires_high_score_when_set() {
        let mut d = Device::new("T1", DeviceType::Sensor);
        d.status = DeviceStatus::Online;
        d.health_score = Some(0.5);
        assert!(!d.is_healthy());
        d.health_score = Some(0.9);
        assert!(d.is_healthy());
    }

    #[test]
    fn rejects_out_of_range_location() {
        let mut d = Device::new("T1", DeviceType::Sensor);
        d.location.lat = Some(200.0);
        assert!(d.validate().is_err());
    }
}
