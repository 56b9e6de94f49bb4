use std::collections::HashMap;

use chrono::{Duration, Utc};
use fleet_domain::{Alert, AlertId, AlertSeverity, AlertStatus, DeviceId, UserId};
use fleet_store::{ensure_table, ConnectionManager, Filter, RepositoryCore, RepositoryError};

pub struct AlertRepository {
    core: RepositoryCore<Alert>,
}

impl AlertRepository {
    pub fn new(manager: ConnectionManager) -> Self {
        Self {
            core: RepositoryCore::new(manager),
        }
    }

    pub async fn ensure_schema(manager: &ConnectionManager) -> Result<(), RepositoryError> {
        ensure_table(manager, "alerts").await
    }

    pub async fn create(&self, alert: &Alert) -> Result<(), RepositoryError> {
        alert.validate()?;
        self.core.create(alert).await
    }

    pub async fn get(&self, id: &AlertId) -> Result<Option<Alert>, RepositoryError> {
        self.core.get(id).await
    }

    pub async fn list_open(&self) -> Result<Vec<Alert>, RepositoryError> {
        let all = self.core.list(&Filter::new().order_by("created_at", true)).await?;
        Ok(all.into_iter().filter(|a| a.is_open()).collect())
    }

    pub async fn list_by_device(&self, device_id: DeviceId) -> Result<Vec<Alert>, RepositoryError> {
        self.core.list(&Filter::new().eq("device_id", device_id)).await
    }

    pub async fn list_by_severity(&self, severity: AlertSeverity) -> Result<Vec<Alert>, RepositoryError> {
        self.core.list(&Filter::new().eq("severity", severity)).await
    }

    pub async fn list_by_status(&self, status: AlertStatus) -> Result<Vec<Alert>, RepositoryError> {
        self.core.list(&Filter::new().eq("status", status)).await
    }

    pub async fn list_critical(&self) -> Result<Vec<Alert>, RepositoryError> {
        self.list_by_severity(AlertSeverity::Critical).await
    }

    /// Alerts whose `first_occurred` falls within the last `hours`.
    pub async fn list_recent(&self, hours: i64) -> Result<Vec<Alert>, RepositoryError> {
        let cutoff = Utc::now() - Duration::hours(hours);
        let all = self.core.list(&Filter::new().order_by("created_at", true)).await?;
        Ok(all.into_iter().filter(|a| a.first_occurred >= cutoff).collect())
    }

    pub async fn statistics(&self) -> Result<AlertStatistics, RepositoryError> {
        let all = self.core.list(&Filter::new()).await?;
        let mut by_severity: HashMap<String, u64> = HashMap::new();
        let mut by_status: HashMap<String, u64> = HashMap::new();
        let mut open = 0;
        let day_ago = Utc::now() - Duration::hours(24);
        let mut last_24h = 0;
        for a in &all {
            *by_severity.entry(a.severity.to_string()).or_default() += 1;
            *by_status.entry(a.status.to_string()).or_default() += 1;
            if a.is_open() {
                open += 1;
            }
            if a.first_occurred >= day_ago {
                last_24h += 1;
            }
        }
        Ok(AlertStatistics {
            total: all.len() as u64,
            open,
            last_24h,
            by_severity,
            by_status,
        })
    }

    pub async fn acknowledge(&self, id: &AlertId, actor: UserId) -> Result<Alert, RepositoryError> {
        let mut alert = self.core.get_required(id).await?;
        alert.status = AlertStatus::Acknowledged;
        alert.acknowledged_by = Some(actor);
        alert.acknowledged_at = Some(Utc::now());
        self.core.update(&mut alert).await?;
        Ok(alert)
    }

    pub async fn resolve(&self, id: &AlertId, actor: UserId, notes: Option<String>) -> Result<Alert, RepositoryError> {
        let mut alert = self.core.get_required(id).await?;
        alert.status = AlertStatus::Resolved;
        alert.resolved_by = Some(actor);
        alert.resolved_at = Some(Utc::now());
        alert.resolution_notes = notes;
        self.core.update(&mut alert).await?;
        Ok(alert)
    }

    /// Bumps `occurrence_count`/`last_occurred` on an existing open alert
    /// instead of creating a duplicate row for the same recurring
    /// condition.
    pub async fn record_recurrence(&self, id: &AlertId) -> Result<Alert, RepositoryError> {
        let mut alert = self.core.get_required(id).await?;
        alert.occurrence_count += 1;
        alert.last_occurred = Utc::now();
        self.core.update(&mut alert).await?;
        Ok(alert)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertStatistics {
    pub total: u64,
    pub open: u64,
    pub last_24h: u64,
    pub by_severity: HashMap<String, u64>,
    pub by_status: HashMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_config::DatabaseConfig;
    use tempfile::TempDir;

    async fn repo(dir: &TempDir) -> AlertRepository {
        let path = dir.path().join("alerts.db");
        let config = DatabaseConfig {
            url: format!("sqlite://{}?mode=rwc", path.display()),
            pool_size: 1,
            max_overflow: 0,
            ..DatabaseConfig::default()
        };
        let manager = ConnectionManager::new(config);
        manager.initialize().await.unwrap();
        AlertRepository::ensure_schema(&manager).await.unwrap();
        AlertRepository::new(manager)
    }

    #[tokio::test]
    async fn list_by_status_and_critical_filter_correctly() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir).await;

        let mut critical = Alert::new("disk full", "capacity", AlertSeverity::Critical);
        repo.create(&critical).await.unwrap();
        let low = Alert::new("firmware drift", "config", AlertSeverity::Low);
        repo.create(&low).await.unwrap();

        assert_eq!(repo.list_critical().await.unwrap().len(), 1);
        assert_eq!(repo.list_by_status(AlertStatus::Open).await.unwrap().len(), 2);

        critical.status = AlertStatus::Resolved;
        repo.core.update(&mut critical).await.unwrap();
        assert_eq!(repo.list_by_status(AlertStatus::Resolved).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_recent_excludes_alerts_outside_the_window() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir).await;

        let mut stale = Alert::new("old alert", "capacity", AlertSeverity::Medium);
        stale.first_occurred = Utc::now() - Duration::hours(48);
        stale.last_occurred = stale.first_occurred;
        repo.create(&stale).await.unwrap();

        let fresh = Alert::new("new alert", "capacity", AlertSeverity::Medium);
        repo.create(&fresh).await.unwrap();

        let recent = repo.list_recent(24).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, fresh.id);
    }

    #[tokio::test]
    async fn statistics_counts_open_and_distributions() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir).await;

        let critical = Alert::new("disk full", "capacity", AlertSeverity::Critical);
        repo.create(&critical).await.unwrap();
        let mut resolved = Alert::new("cleared", "capacity", AlertSeverity::Low);
        resolved.status = AlertStatus::Resolved;
        repo.create(&resolved).await.unwrap();

        let stats = repo.statistics().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.open, 1);
        assert_eq!(stats.by_severity.get("critical"), Some(&1));
        assert_eq!(stats.by_status.get("resolved"), Some(&1));
        assert_eq!(stats.last_24h, 2);
    }
}
