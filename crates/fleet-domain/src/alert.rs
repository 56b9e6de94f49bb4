use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DomainError, DomainResult};
use crate::ids::{AlertId, DeviceId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertSeverity::Critical => "critical",
            AlertSeverity::High => "high",
            AlertSeverity::Medium => "medium",
            AlertSeverity::Low => "low",
            AlertSeverity::Info => "info",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Open,
    Acknowledged,
    InProgress,
    Resolved,
    Closed,
    Suppressed,
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertStatus::Open => "open",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::InProgress => "in_progress",
            AlertStatus::Resolved => "resolved",
            AlertStatus::Closed => "closed",
            AlertStatus::Suppressed => "suppressed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub title: String,
    pub description: Option<String>,
    pub alert_type: String,
    pub severity: AlertSeverity,
    pub status: AlertStatus,

    pub device_id: Option<DeviceId>,
    pub rule_id: Option<String>,

    pub first_occurred: DateTime<Utc>,
    pub last_occurred: DateTime<Utc>,
    pub occurrence_count: u64,
    pub priority: u8,

    pub acknowledged_by: Option<UserId>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<UserId>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_notes: Option<String>,
    pub resolution_action: Option<String>,

    pub tags: Vec<String>,

    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn new(title: impl Into<String>, alert_type: impl Into<String>, severity: AlertSeverity) -> Self {
        let now = Utc::now();
        Self {
            id: AlertId::new(),
            title: title.into(),
            description: None,
            alert_type: alert_type.into(),
            severity,
            status: AlertStatus::Open,
            device_id: None,
            rule_id: None,
            first_occurred: now,
            last_occurred: now,
            occurrence_count: 1,
            priority: 0,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_by: None,
            resolved_at: None,
            resolution_notes: None,
            resolution_action: None,
            tags: Vec::new(),
            metadata: Value::Object(Default::default()),
            created_at: now,
            updated_at: now,
            deleted: false,
            deleted_at: None,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.first_occurred > self.last_occurred {
            return Err(DomainError::Invalid {
                field: "first_occurred",
                message: "first_occurred must be <= last_occurred".into(),
            });
        }
        if self.occurrence_count == 0 {
            return Err(DomainError::OutOfRange {
                field: "occurrence_count",
                message: "must be >= 1".into(),
            });
        }
        if self.priority > 100 {
            return Err(DomainError::OutOfRange {
                field: "priority",
                message: format!("{} not in [0, 100]", self.priority),
            });
        }
        Ok(())
    }

    /// An alert is "open" iff status ∈ {open, acknowledged, in_progress}.
    pub fn is_open(&self) -> bool {
        matches!(self.status, AlertStatus::Open | AlertStatus::Acknowledged | AlertStatus::InProgress)
    }
}
