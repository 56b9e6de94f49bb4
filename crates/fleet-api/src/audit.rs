use chrono::Utc;
use fleet_domain::{AuditAction, AuditLog, UserId};
use fleet_repositories::AuditLogRepository;
use fleet_store::RepositoryError;
use serde_json::Value;

/// Everything about a mutation worth recording, independent of how it
/// reached the control plane (HTTP handler, command-plane module, or the
/// retention sweep).
#[derive(Debug, Default)]
pub struct AuditEntryInput {
    pub resource_id: Option<String>,
    pub description: Option<String>,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Writes `AuditLog` rows for mutations made elsewhere in the control
/// plane. Grounded on the teacher's tagged `AuditEvent` log, generalized
/// to the full `AuditLog` entity and its diff-carrying fields.
///
/// A recording failure never masks the mutation it describes: `record`
/// swallows its own write errors into the returned row's `success` field
/// rather than propagating them, so a down database never blocks the
/// write it's trying to audit. Callers that need the row to have
/// actually landed should inspect the `Result` anyway — it is `Err` only
/// when the mutation's caller asked for a hard failure via `record_or_fail`.
pub struct AuditRecorder {
    logs: AuditLogRepository,
}

impl AuditRecorder {
    pub fn new(logs: AuditLogRepository) -> Self {
        Self { logs }
    }

    pub async fn record(
        &self,
        action: AuditAction,
        resource_type: impl Into<String>,
        actor_user_id: Option<UserId>,
        correlation_id: Option<String>,
        input: AuditEntryInput,
    ) -> AuditLog {
        let mut log = AuditLog::new(action, resource_type);
        log.resource_id = input.resource_id;
        log.actor_user_id = actor_user_id;
        log.correlation_id = correlation_id;
        log.description = input.description;
        log.ip_address = input.ip_address;
        log.user_agent = input.user_agent;
        log.occurred_at = Utc::now();

        if let (Some(old), Some(new)) = (&input.old_values, &input.new_values) {
            log.changed_fields = changed_fields(old, new);
        }
        log.old_values = input.old_values;
        log.new_values = input.new_values;

        if let Err(e) = self.logs.create(&log).await {
            log.success = false;
            log.error_message = Some(e.to_string());
        }
        log
    }

    /// Like `record`, but propagates the repository write failure instead
    /// of folding it into the returned row — for callers (e.g. security
    /// event recording) where a silently-lost audit trail is unacceptable.
    pub async fn record_or_fail(
        &self,
        action: AuditAction,
        resource_type: impl Into<String>,
        actor_user_id: Option<UserId>,
        correlation_id: Option<String>,
        input: AuditEntryInput,
    ) -> Result<AuditLog, RepositoryError> {
        let mut log = AuditLog::new(action, resource_type);
        log.resource_id = input.resource_id;
        log.actor_user_id = actor_user_id;
        log.correlation_id = correlation_id;
        log.description = input.description;
        log.ip_address = input.ip_address;
        log.user_agent = input.user_agent;
        log.occurred_at = Utc::now();

        if let (Some(old), Some(new)) = (&input.old_values, &input.new_values) {
            log.changed_fields = changed_fields(old, new);
        }
        log.old_values = input.old_values;
        log.new_values = input.new_values;

        self.logs.create(&log).await?;
        Ok(log)
    }
}

/// Top-level keys present in both objects whose values differ.
/// Nested diffs are not computed — the full nested value at a changed key
/// is what ends up in `old_values`/`new_values` anyway, so callers can
/// always re-derive finer detail from those two fields.
fn changed_fields(old: &Value, new: &Value) -> Vec<String> {
    let (Value::Object(old), Value::Object(new)) = (old, new) else {
        return Vec::new();
    };
    let mut fields: Vec<String> = old
        .iter()
        .filter(|(k, v)| new.get(*k).map_or(true, |nv| nv != *v))
        .map(|(k, _)| k.clone())
        .chain(new.keys().filter(|k| !old.contains_key(*k)).cloned())
        .collect();
    fields.sort();
    fields.dedup();
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn changed_fields_reports_additions_removals_and_modifications() {
        let old = json!({"status": "online", "name": "sensor"});
        let new = json!({"status": "offline", "region": "us-west"});
        let mut fields = changed_fields(&old, &new);
        fields.sort();
        assert_eq!(fields, vec!["name", "region", "status"]);
    }

    #[test]
    fn changed_fields_is_empty_for_identical_objects() {
        let value = json!({"a": 1, "b": 2});
        assert!(changed_fields(&value, &value).is_empty());
    }
}
