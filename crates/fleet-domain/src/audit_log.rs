use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{AuditLogId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Read,
    Update,
    Delete,
    Login,
    Logout,
    Authenticate,
    Authorize,
    Configure,
    Deploy,
    Start,
    Stop,
    Restart,
    Backup,
    Restore,
    Export,
    Import,
    Approve,
    Reject,
    Assign,
    Unassign,
    Enable,
    Disable,
    Custom,
}

impl AuditAction {
    /// §4.F `list_security_events`: login/logout/authenticate/authorize, or success=false.
    pub fn is_security_relevant(&self) -> bool {
        matches!(
            self,
            AuditAction::Login | AuditAction::Logout | AuditAction::Authenticate | AuditAction::Authorize
        )
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "custom".to_string());
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: AuditLogId,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub actor_user_id: Option<UserId>,
    pub session_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
    pub correlation_id: Option<String>,

    pub description: Option<String>,
    pub details: Value,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
    pub changed_fields: Vec<String>,

    pub success: bool,
    pub error_code: Option<String>,
    pub error_message: Option<String>,

    pub occurred_at: DateTime<Utc>,
    pub duration_ms: Option<u64>,

    pub source_system: Option<String>,
    pub source_method: Option<String>,

    pub retention_days: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl AuditLog {
    pub fn new(action: AuditAction, resource_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: AuditLogId::new(),
            action,
            resource_type: resource_type.into(),
            resource_id: None,
            actor_user_id: None,
            session_id: None,
            ip_address: None,
            user_agent: None,
            request_id: None,
            correlation_id: None,
            description: None,
            details: Value::Object(Default::default()),
            old_values: None,
            new_values: None,
            changed_fields: Vec::new(),
            success: true,
            error_code: None,
            error_message: None,
            occurred_at: now,
            duration_ms: None,
            source_system: None,
            source_method: None,
            retention_days: 365,
            created_at: now,
            updated_at: now,
            deleted: false,
            deleted_at: None,
        }
    }
}
