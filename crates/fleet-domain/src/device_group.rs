use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DomainError, DomainResult};
use crate::ids::{DeviceGroupId, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceGroup {
    pub id: DeviceGroupId,
    pub name: String,
    pub parent_id: Option<DeviceGroupId>,
    pub owner_id: Option<UserId>,
    /// Free-form classification (e.g. "location", "fleet", "department");
    /// `None` for groups with no declared type.
    pub group_type: Option<String>,

    /// Static groups hold an explicit device membership list (tracked by
    /// the repository layer); dynamic groups compute membership from
    /// `membership_criteria` against the device table.
    pub dynamic: bool,
    pub membership_criteria: Value,

    pub device_count: u64,
    pub active_device_count: u64,

    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl DeviceGroup {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: DeviceGroupId::new(),
            name: name.into(),
            parent_id: None,
            owner_id: None,
            group_type: None,
            dynamic: false,
            membership_criteria: Value::Object(Default::default()),
            device_count: 0,
            active_device_count: 0,
            metadata: Value::Object(Default::default()),
            created_at: now,
            updated_at: now,
            deleted: false,
            deleted_at: None,
        }
    }

    /// §9 open question, resolved as eager maintenance:
    /// `0 ≤ active_device_count ≤ device_count` must always hold.
    pub fn validate(&self) -> DomainResult<()> {
        if self.active_device_count > self.device_count {
            return Err(DomainError::GroupCounterInvariant {
                active: self.active_device_count,
                total: self.device_count,
            });
        }
        Ok(())
    }

    pub fn set_counts(&mut self, device_count: u64, active_device_count: u64) -> DomainResult<()> {
        self.device_count = device_count;
        self.active_device_count = active_device_count;
        self.validate()
    }
}
