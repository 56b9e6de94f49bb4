use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use fleet_domain::{Analytics, AnalyticsId, AnalyticsScope};
use fleet_store::{ensure_table, ConnectionManager, Filter, RepositoryCore, RepositoryError};

pub struct AnalyticsRepository {
    core: RepositoryCore<Analytics>,
}

impl AnalyticsRepository {
    pub fn new(manager: ConnectionManager) -> Self {
        Self {
            core: RepositoryCore::new(manager),
        }
    }

    pub async fn ensure_schema(manager: &ConnectionManager) -> Result<(), RepositoryError> {
        ensure_table(manager, "analytics").await
    }

    pub async fn create(&self, analytics: &Analytics) -> Result<(), RepositoryError> {
        analytics.validate()?;
        self.core.create(analytics).await
    }

    pub async fn get(&self, id: &AnalyticsId) -> Result<Option<Analytics>, RepositoryError> {
        self.core.get(id).await
    }

    pub async fn list_by_metric(&self, metric_name: &str) -> Result<Vec<Analytics>, RepositoryError> {
        self.core.list(&Filter::new().eq("metric_name", metric_name)).await
    }

    /// All rows computed over `scope`, newest first.
    pub async fn list_by_scope(&self, scope: &AnalyticsScope) -> Result<Vec<Analytics>, RepositoryError> {
        let all = self
            .core
            .list(&Filter::new().order_by("created_at", true))
            .await?;
        Ok(all.into_iter().filter(|a| &a.scope == scope).collect())
    }

    pub async fn latest_for_scope(&self, scope: &AnalyticsScope, metric_name: &str) -> Result<Option<Analytics>, RepositoryError> {
        Ok(self
            .list_by_scope(scope)
            .await?
            .into_iter()
            .find(|a| a.metric_name == metric_name))
    }

    /// Newest row per distinct `metric_name` for `analytics_type`, optionally
    /// narrowed to one scope — the dashboard "current value" view.
    pub async fn latest_metrics(
        &self,
        analytics_type: &str,
        scope: Option<&AnalyticsScope>,
    ) -> Result<Vec<Analytics>, RepositoryError> {
        let all = self
            .core
            .list(&Filter::new().eq("analytics_type", analytics_type).order_by("created_at", true))
            .await?;
        let mut latest: HashMap<String, Analytics> = HashMap::new();
        for row in all {
            if let Some(scope) = scope {
                if &row.scope != scope {
                    continue;
                }
            }
            latest
                .entry(row.metric_name.clone())
                .and_modify(|existing| {
                    if row.period_end > existing.period_end {
                        *existing = row.clone();
                    }
                })
                .or_insert(row);
        }
        let mut out: Vec<Analytics> = latest.into_values().collect();
        out.sort_by_key(|a| a.metric_name.clone());
        Ok(out)
    }

    /// Rows for `metric_name` over the last `days`, oldest first, optionally
    /// narrowed to one scope.
    pub async fn trend(
        &self,
        metric_name: &str,
        days: i64,
        scope: Option<&AnalyticsScope>,
    ) -> Result<Vec<Analytics>, RepositoryError> {
        let cutoff = Utc::now() - Duration::days(days);
        let mut rows: Vec<Analytics> = self
            .list_by_metric(metric_name)
            .await?
            .into_iter()
            .filter(|a| a.period_end >= cutoff)
            .filter(|a| scope.map_or(true, |s| &a.scope == s))
            .collect();
        rows.sort_by_key(|a| a.period_start);
        Ok(rows)
    }

    pub async fn summary(
        &self,
        analytics_type: &str,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<AnalyticsSummary, RepositoryError> {
        let rows: Vec<Analytics> = self
            .core
            .list(&Filter::new().eq("analytics_type", analytics_type))
            .await?
            .into_iter()
            .filter(|a| since.map_or(true, |s| a.period_end >= s))
            .filter(|a| until.map_or(true, |u| a.period_start <= u))
            .collect();

        let mut by_metric: HashMap<String, u64> = HashMap::new();
        for row in &rows {
            *by_metric.entry(row.metric_name.clone()).or_default() += 1;
        }

        Ok(AnalyticsSummary {
            total: rows.len() as u64,
            by_metric,
        })
    }

    /// Hard-deletes rows whose `period_end` predates `retention_days`;
    /// returns the count removed.
    pub async fn cleanup(&self, retention_days: i64) -> Result<u64, RepositoryError> {
        let cutoff = Utc::now() - Duration::days(retention_days);
        let stale = self
            .core
            .list(&Filter::new())
            .await?
            .into_iter()
            .filter(|a| a.period_end < cutoff)
            .collect::<Vec<_>>();
        let count = stale.len() as u64;
        for row in stale {
            self.core.hard_delete(&row.id).await?;
        }
        Ok(count)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsSummary {
    pub total: u64,
    pub by_metric: HashMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_config::DatabaseConfig;
    use fleet_domain::{AggregationKind, StatisticalSummary};
    use serde_json::Value;
    use tempfile::TempDir;

    async fn repo(dir: &TempDir) -> AnalyticsRepository {
        let path = dir.path().join("analytics.db");
        let config = DatabaseConfig {
            url: format!("sqlite://{}?mode=rwc", path.display()),
            pool_size: 1,
            max_overflow: 0,
            ..DatabaseConfig::default()
        };
        let manager = ConnectionManager::new(config);
        manager.initialize().await.unwrap();
        AnalyticsRepository::ensure_schema(&manager).await.unwrap();
        AnalyticsRepository::new(manager)
    }

    fn row(metric_name: &str, period_start: DateTime<Utc>, period_end: DateTime<Utc>, value: f64) -> Analytics {
        Analytics {
            id: fleet_domain::AnalyticsId::new(),
            analytics_type: "device_health".into(),
            metric_name: metric_name.into(),
            aggregation: AggregationKind::Avg,
            period_start,
            period_end,
            granularity: Some("hour".into()),
            scope: AnalyticsScope::Global,
            value: Some(value),
            count_value: None,
            percentage_value: None,
            summary: StatisticalSummary::default(),
            units: None,
            confidence: None,
            data_quality: None,
            payload: Value::Null,
            metadata: Value::Null,
            created_at: period_end,
            updated_at: period_end,
            deleted: false,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn latest_metrics_keeps_newest_row_per_metric() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir).await;
        let now = Utc::now();

        repo.create(&row("battery_avg", now - Duration::hours(2), now - Duration::hours(1), 70.0))
            .await
            .unwrap();
        repo.create(&row("battery_avg", now - Duration::hours(1), now, 75.0)).await.unwrap();
        repo.create(&row("uptime_pct", now - Duration::hours(1), now, 99.9)).await.unwrap();

        let latest = repo.latest_metrics("device_health", None).await.unwrap();
        assert_eq!(latest.len(), 2);
        let battery = latest.iter().find(|a| a.metric_name == "battery_avg").unwrap();
        assert_eq!(battery.value, Some(75.0));
    }

    #[tokio::test]
    async fn trend_filters_by_window_and_orders_oldest_first() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir).await;
        let now = Utc::now();

        repo.create(&row("battery_avg", now - Duration::days(40), now - Duration::days(39), 60.0))
            .await
            .unwrap();
        repo.create(&row("battery_avg", now - Duration::days(2), now - Duration::days(1), 70.0))
            .await
            .unwrap();
        repo.create(&row("battery_avg", now - Duration::hours(1), now, 80.0)).await.unwrap();

        let trend = repo.trend("battery_avg", 7, None).await.unwrap();
        assert_eq!(trend.len(), 2);
        assert!(trend[0].period_start < trend[1].period_start);
    }

    #[tokio::test]
    async fn cleanup_hard_deletes_rows_older_than_retention() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir).await;
        let now = Utc::now();

        let old = row("battery_avg", now - Duration::days(100), now - Duration::days(99), 50.0);
        repo.create(&old).await.unwrap();
        let recent = row("battery_avg", now - Duration::hours(1), now, 80.0);
        repo.create(&recent).await.unwrap();

        let removed = repo.cleanup(30).await.unwrap();
        assert_eq!(removed, 1);
        assert!(repo.get(&old.id).await.unwrap().is_none());
        assert!(repo.get(&recent.id).await.unwrap().is_some());
    }
}
