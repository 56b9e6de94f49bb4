use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use fleet_domain::{AuditAction, AuditLog, AuditLogId, UserId};
use fleet_store::{ensure_table, ConnectionManager, Filter, RepositoryCore, RepositoryError};

pub struct AuditLogRepository {
    core: RepositoryCore<AuditLog>,
}

impl AuditLogRepository {
    pub fn new(manager: ConnectionManager) -> Self {
        Self {
            core: RepositoryCore::new(manager),
        }
    }

    pub async fn ensure_schema(manager: &ConnectionManager) -> Result<(), RepositoryError> {
        ensure_table(manager, "audit_logs").await
    }

    pub async fn create(&self, log: &AuditLog) -> Result<(), RepositoryError> {
        self.core.create(log).await
    }

    pub async fn get(&self, id: &AuditLogId) -> Result<Option<AuditLog>, RepositoryError> {
        self.core.get(id).await
    }

    pub async fn list_by_actor(&self, actor: UserId) -> Result<Vec<AuditLog>, RepositoryError> {
        self.core.list(&Filter::new().eq("actor_user_id", actor)).await
    }

    /// Alias for [`Self::list_by_actor`] under the name the rest of the
    /// domain uses for "who did this".
    pub async fn list_by_user(&self, actor: UserId) -> Result<Vec<AuditLog>, RepositoryError> {
        self.list_by_actor(actor).await
    }

    pub async fn list_by_action(&self, action: AuditAction) -> Result<Vec<AuditLog>, RepositoryError> {
        self.core.list(&Filter::new().eq("action", action)).await
    }

    pub async fn list_by_resource(
        &self,
        resource_type: &str,
        resource_id: Option<&str>,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuditLog>, RepositoryError> {
        let all = self
            .core
            .list(&Filter::new().eq("resource_type", resource_type))
            .await?;
        Ok(all
            .into_iter()
            .filter(|l| resource_id.map_or(true, |rid| l.resource_id.as_deref() == Some(rid)))
            .filter(|l| since.map_or(true, |s| l.occurred_at >= s))
            .filter(|l| until.map_or(true, |u| l.occurred_at <= u))
            .collect())
    }

    pub async fn list_failed(&self) -> Result<Vec<AuditLog>, RepositoryError> {
        let all = self.core.list(&Filter::new()).await?;
        Ok(all.into_iter().filter(|l| !l.success).collect())
    }

    pub async fn list_recent(&self, limit: u32) -> Result<Vec<AuditLog>, RepositoryError> {
        self.core
            .list(&Filter::new().order_by("occurred_at", true).limit(limit))
            .await
    }

    /// Login/logout/authenticate/authorize events, plus any failed action
    /// regardless of kind — the set security review actually wants.
    pub async fn list_security_events(&self) -> Result<Vec<AuditLog>, RepositoryError> {
        let all = self.core.list(&Filter::new().order_by("occurred_at", true)).await?;
        Ok(all
            .into_iter()
            .filter(|l| l.action.is_security_relevant() || !l.success)
            .collect())
    }

    pub async fn list_in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<AuditLog>, RepositoryError> {
        let all = self.core.list(&Filter::new()).await?;
        Ok(all
            .into_iter()
            .filter(|l| l.occurred_at >= start && l.occurred_at <= end)
            .collect())
    }

    pub async fn statistics(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<AuditLogStatistics, RepositoryError> {
        let rows: Vec<AuditLog> = self
            .core
            .list(&Filter::new())
            .await?
            .into_iter()
            .filter(|l| since.map_or(true, |s| l.occurred_at >= s))
            .filter(|l| until.map_or(true, |u| l.occurred_at <= u))
            .collect();

        let mut by_action: HashMap<String, u64> = HashMap::new();
        let mut by_resource: HashMap<String, u64> = HashMap::new();
        let mut failed = 0;
        for l in &rows {
            *by_action.entry(l.action.to_string()).or_default() += 1;
            *by_resource.entry(l.resource_type.clone()).or_default() += 1;
            if !l.success {
                failed += 1;
            }
        }

        Ok(AuditLogStatistics {
            total: rows.len() as u64,
            failed,
            by_action,
            by_resource,
        })
    }

    /// Hard-deletes rows older than their own `retention_days`, capped by
    /// `days` — mirrors the retention sweep every audit subsystem runs
    /// periodically. Returns the count removed.
    pub async fn cleanup(&self, days: i64) -> Result<u64, RepositoryError> {
        let cutoff = Utc::now() - Duration::days(days);
        let stale = self
            .core
            .list(&Filter::new())
            .await?
            .into_iter()
            .filter(|l| l.occurred_at < cutoff)
            .collect::<Vec<_>>();
        let count = stale.len() as u64;
        for log in stale {
            self.core.hard_delete(&log.id).await?;
        }
        Ok(count)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditLogStatistics {
    pub total: u64,
    pub failed: u64,
    pub by_action: HashMap<String, u64>,
    pub by_resource: HashMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_config::DatabaseConfig;
    use tempfile::TempDir;

    async fn repo(dir: &TempDir) -> AuditLogRepository {
        let path = dir.path().join("audit.db");
        let config = DatabaseConfig {
            url: format!("sqlite://{}?mode=rwc", path.display()),
            pool_size: 1,
            max_overflow: 0,
            ..DatabaseConfig::default()
        };
        let manager = ConnectionManager::new(config);
        manager.initialize().await.unwrap();
        AuditLogRepository::ensure_schema(&manager).await.unwrap();
        AuditLogRepository::new(manager)
    }

    #[tokio::test]
    async fn list_by_action_and_by_resource_filter_correctly() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir).await;

        let mut login = AuditLog::new(AuditAction::Login, "session");
        login.resource_id = Some("sess-1".into());
        repo.create(&login).await.unwrap();

        let mut update = AuditLog::new(AuditAction::Update, "device");
        update.resource_id = Some("dev-1".into());
        repo.create(&update).await.unwrap();

        assert_eq!(repo.list_by_action(AuditAction::Login).await.unwrap().len(), 1);
        assert_eq!(repo.list_by_resource("device", Some("dev-1"), None, None).await.unwrap().len(), 1);
        assert_eq!(repo.list_by_resource("device", Some("dev-2"), None, None).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn list_failed_returns_only_unsuccessful_entries() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir).await;

        let ok = AuditLog::new(AuditAction::Read, "device");
        repo.create(&ok).await.unwrap();

        let mut failed = AuditLog::new(AuditAction::Authenticate, "session");
        failed.success = false;
        failed.error_code = Some("bad_credentials".into());
        repo.create(&failed).await.unwrap();

        let results = repo.list_failed().await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, failed.id);
    }

    #[tokio::test]
    async fn statistics_and_cleanup_behave() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir).await;

        let mut old = AuditLog::new(AuditAction::Login, "session");
        old.occurred_at = Utc::now() - Duration::days(400);
        repo.create(&old).await.unwrap();

        let mut recent = AuditLog::new(AuditAction::Login, "session");
        recent.success = false;
        repo.create(&recent).await.unwrap();

        let stats = repo.statistics(None, None).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.by_action.get("login"), Some(&2));

        let removed = repo.cleanup(365).await.unwrap();
        assert_eq!(removed, 1);
        assert!(repo.get(&old.id).await.unwrap().is_none());
        assert!(repo.get(&recent.id).await.unwrap().is_some());
    }
}
