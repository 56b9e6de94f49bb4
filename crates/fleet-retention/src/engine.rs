use chrono::{Duration, Utc};
use fleet_domain::{Alert, AlertStatus, Analytics, AuditLog, TelemetryEvent};
use fleet_store::{ConnectionManager, Entity, Filter, FilterOp, RepositoryCore};
use serde::Serialize;
use tracing::{info, warn};

use crate::archive::write_and_verify;
use crate::error::RetentionError;
use crate::policy::{RetentionPolicy, RetentionType};

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RetentionResult {
    pub data_type: Option<RetentionType>,
    pub rows_examined: u64,
    pub rows_archived: u64,
    pub rows_deleted: u64,
    pub archive_path: Option<String>,
}

/// Applies retention policies by age: loads everything older than the
/// cutoff, archives it (if the policy says to), then soft-deletes it via
/// the generic storage layer. Mirrors the reconciler's "load state, diff
/// against a cutoff, act, report" shape, specialized to a single pass
/// over one data type.
pub struct RetentionEngine {
    telemetry: RepositoryCore<TelemetryEvent>,
    analytics: RepositoryCore<Analytics>,
    audit_logs: RepositoryCore<AuditLog>,
    alerts: RepositoryCore<Alert>,
}

impl RetentionEngine {
    pub fn new(manager: ConnectionManager) -> Self {
        Self {
            telemetry: RepositoryCore::new(manager.clone()),
            analytics: RepositoryCore::new(manager.clone()),
            audit_logs: RepositoryCore::new(manager.clone()),
            alerts: RepositoryCore::new(manager),
        }
    }

    pub async fn apply(&self, policy: &RetentionPolicy) -> Result<RetentionResult, RetentionError> {
        let cutoff = Utc::now() - Duration::days(policy.retention_days as i64);
        info!(data_type = ?policy.data_type, %cutoff, "applying retention policy");

        let older_than_cutoff = Filter::new().op("created_at", FilterOp::Lt(serde_json::json!(cutoff)));

        match policy.data_type {
            RetentionType::TelemetryRaw | RetentionType::TelemetryAggregated => {
                let expired = self.telemetry.list(&older_than_cutoff).await?;
                self.archive_then_delete(policy, &expired, &self.telemetry).await
            }
            RetentionType::Analytics => {
                let expired = self.analytics.list(&older_than_cutoff).await?;
                self.archive_then_delete(policy, &expired, &self.analytics).await
            }
            RetentionType::AuditLog => {
                let expired = self.audit_logs.list(&older_than_cutoff).await?;
                self.archive_then_delete(policy, &expired, &self.audit_logs).await
            }
            RetentionType::Alert => {
                let all = self.alerts.list(&older_than_cutoff).await?;
                // Only resolved/closed alerts are eligible — open alerts
                // never expire out from under an operator regardless of age.
                let expired: Vec<_> = all
                    .into_iter()
                    .filter(|a| matches!(a.status, AlertStatus::Resolved | AlertStatus::Closed))
                    .collect();
                self.archive_then_delete(policy, &expired, &self.alerts).await
            }
        }
    }

    async fn archive_then_delete<T>(
        &self,
        policy: &RetentionPolicy,
        rows: &[T],
        core: &RepositoryCore<T>,
    ) -> Result<RetentionResult, RetentionError>
    where
        T: Entity + Serialize + Clone,
    {
        let mut result = RetentionResult {
            data_type: Some(policy.data_type),
            rows_examined: rows.len() as u64,
            ..Default::default()
        };

        if rows.is_empty() {
            return Ok(result);
        }

        if policy.archive_before_delete {
            let label = format!("{:?}-{}", policy.data_type, Utc::now().timestamp()).to_lowercase();
            let path = write_and_verify(
                std::path::Path::new(&policy.archive_directory),
                &label,
                policy.archive_format,
                rows,
            )?;
            result.archive_path = Some(path.display().to_string());
            result.rows_archived = rows.len() as u64;
        }

        for row in rows {
            match core.delete(&row.id()).await {
                Ok(()) => result.rows_deleted += 1,
                Err(e) => warn!(error = %e, "retention delete failed for one row, continuing"),
            }
        }

        Ok(result)
    }
}
