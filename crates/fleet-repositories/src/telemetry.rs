use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use fleet_domain::{AggregationKind, DeviceId, TelemetryEvent, TelemetryEventId, TelemetryEventType};
use fleet_store::{ensure_table, ConnectionManager, Filter, FilterOp, RepositoryCore, RepositoryError};

pub struct TelemetryRepository {
    core: RepositoryCore<TelemetryEvent>,
}

impl TelemetryRepository {
    pub fn new(manager: ConnectionManager) -> Self {
        Self {
            core: RepositoryCore::new(manager),
        }
    }

    pub async fn ensure_schema(manager: &ConnectionManager) -> Result<(), RepositoryError> {
        ensure_table(manager, "telemetry_events").await
    }

    pub async fn create(&self, event: &TelemetryEvent) -> Result<(), RepositoryError> {
        event.validate()?;
        self.core.create(event).await
    }

    pub async fn bulk_create(&self, events: &[TelemetryEvent]) -> Result<(), RepositoryError> {
        for event in events {
            event.validate()?;
        }
        self.core.bulk_create(events).await
    }

    pub async fn get(&self, id: &TelemetryEventId) -> Result<Option<TelemetryEvent>, RepositoryError> {
        self.core.get(id).await
    }

    pub async fn list_by_device(&self, device_id: DeviceId, limit: u32) -> Result<Vec<TelemetryEvent>, RepositoryError> {
        let filter = Filter::new()
            .eq("device_id", device_id)
            .order_by("created_at", true)
            .limit(limit);
        self.core.list(&filter).await
    }

    pub async fn list_by_type(&self, event_type: TelemetryEventType) -> Result<Vec<TelemetryEvent>, RepositoryError> {
        self.core.list(&Filter::new().eq("event_type", event_type)).await
    }

    /// Events for `device_id` whose `occurred_at` falls in `[start, end]`,
    /// the shape every dashboard time-series query needs.
    pub async fn list_in_range(
        &self,
        device_id: DeviceId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TelemetryEvent>, RepositoryError> {
        let all = self.core.list(&Filter::new().eq("device_id", device_id)).await?;
        Ok(all
            .into_iter()
            .filter(|e| e.occurred_at >= start && e.occurred_at <= end)
            .collect())
    }

    pub async fn latest_for_device(&self, device_id: DeviceId) -> Result<Option<TelemetryEvent>, RepositoryError> {
        let filter = Filter::new()
            .eq("device_id", device_id)
            .order_by("created_at", true)
            .limit(1);
        Ok(self.core.list(&filter).await?.into_iter().next())
    }

    pub async fn count_unprocessed(&self) -> Result<u64, RepositoryError> {
        self.core
            .count(&Filter::new().op("processed", FilterOp::Eq(serde_json::json!(false))))
            .await
    }

    pub async fn mark_processed(&self, id: &TelemetryEventId, processing_duration_ms: u64) -> Result<(), RepositoryError> {
        let mut event = self.core.get_required(id).await?;
        event.processed = true;
        event.processed_at = Some(Utc::now());
        event.processing_duration_ms = Some(processing_duration_ms);
        self.core.update(&mut event).await
    }

    /// Numeric values for `device_id`/`event_name` with `occurred_at` in
    /// `[since, until]`, oldest first — the common fetch behind `aggregate`
    /// and `time_series`.
    async fn numeric_series(
        &self,
        device_id: DeviceId,
        event_name: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, f64)>, RepositoryError> {
        let filter = Filter::new()
            .eq("device_id", device_id)
            .op("event_name", FilterOp::Eq(serde_json::json!(event_name)));
        let mut series: Vec<(DateTime<Utc>, f64)> = self
            .core
            .list(&filter)
            .await?
            .into_iter()
            .filter(|e| e.occurred_at >= since && e.occurred_at <= until)
            .filter_map(|e| e.numeric_value().map(|v| (e.occurred_at, v)))
            .collect();
        series.sort_by_key(|(t, _)| *t);
        Ok(series)
    }

    /// `kind` ∈ {avg, sum, min, max, count}; other [`AggregationKind`]
    /// variants aren't meaningful over a raw numeric series and return
    /// `None`.
    pub async fn aggregate(
        &self,
        device_id: DeviceId,
        event_name: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        kind: AggregationKind,
    ) -> Result<Option<f64>, RepositoryError> {
        let values: Vec<f64> = self
            .numeric_series(device_id, event_name, since, until)
            .await?
            .into_iter()
            .map(|(_, v)| v)
            .collect();
        if values.is_empty() && kind != AggregationKind::Count {
            return Ok(None);
        }
        Ok(match kind {
            AggregationKind::Avg => Some(values.iter().sum::<f64>() / values.len() as f64),
            AggregationKind::Sum => Some(values.iter().sum()),
            AggregationKind::Min => values.iter().cloned().fold(f64::INFINITY, f64::min).into(),
            AggregationKind::Max => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max).into(),
            AggregationKind::Count => Some(values.len() as f64),
            _ => None,
        })
    }

    /// Buckets the numeric series into fixed `bucket_minutes` windows
    /// anchored at `since`, each reporting mean/count/min/max.
    pub async fn time_series(
        &self,
        device_id: DeviceId,
        event_name: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        bucket_minutes: i64,
    ) -> Result<Vec<TelemetryBucket>, RepositoryError> {
        let series = self.numeric_series(device_id, event_name, since, until).await?;
        let bucket_width = Duration::minutes(bucket_minutes.max(1));

        let mut buckets: Vec<(DateTime<Utc>, Vec<f64>)> = Vec::new();
        for (t, v) in series {
            let offset = (t - since).num_seconds().max(0);
            let bucket_index = offset / bucket_width.num_seconds().max(1);
            let bucket_start = since + Duration::seconds(bucket_index * bucket_width.num_seconds());
            match buckets.last_mut() {
                Some((start, values)) if *start == bucket_start => values.push(v),
                _ => buckets.push((bucket_start, vec![v])),
            }
        }

        Ok(buckets
            .into_iter()
            .map(|(timestamp, values)| TelemetryBucket {
                timestamp,
                value: values.iter().sum::<f64>() / values.len() as f64,
                count: values.len() as u64,
                min: values.iter().cloned().fold(f64::INFINITY, f64::min),
                max: values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            })
            .collect())
    }

    /// Hard-deletes events older than `retention_days`; returns the count removed.
    pub async fn cleanup(&self, retention_days: i64) -> Result<u64, RepositoryError> {
        let cutoff = Utc::now() - Duration::days(retention_days);
        let stale = self
            .core
            .list(&Filter::new())
            .await?
            .into_iter()
            .filter(|e| e.occurred_at < cutoff)
            .collect::<Vec<_>>();
        let count = stale.len() as u64;
        for event in stale {
            self.core.hard_delete(&event.id).await?;
        }
        Ok(count)
    }

    pub async fn statistics(
        &self,
        device_id: DeviceId,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<TelemetryStatistics, RepositoryError> {
        let all = self.core.list(&Filter::new().eq("device_id", device_id)).await?;
        let filtered: Vec<&TelemetryEvent> = all
            .iter()
            .filter(|e| since.map_or(true, |s| e.occurred_at >= s))
            .filter(|e| until.map_or(true, |u| e.occurred_at <= u))
            .collect();

        let mut by_type: HashMap<String, u64> = HashMap::new();
        let mut latest: Option<DateTime<Utc>> = None;
        for e in &filtered {
            *by_type.entry(e.event_type.to_string()).or_default() += 1;
            latest = latest.map(|l| l.max(e.occurred_at)).or(Some(e.occurred_at));
        }

        Ok(TelemetryStatistics {
            total_events: filtered.len() as u64,
            by_type,
            latest_event_time: latest,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryBucket {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub count: u64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryStatistics {
    pub total_events: u64,
    pub by_type: HashMap<String, u64>,
    pub latest_event_time: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_config::DatabaseConfig;
    use fleet_domain::{DeviceId, TelemetryValue};
    use tempfile::TempDir;

    async fn repo(dir: &TempDir) -> TelemetryRepository {
        let path = dir.path().join("telemetry.db");
        let config = DatabaseConfig {
            url: format!("sqlite://{}?mode=rwc", path.display()),
            pool_size: 1,
            max_overflow: 0,
            ..DatabaseConfig::default()
        };
        let manager = ConnectionManager::new(config);
        manager.initialize().await.unwrap();
        TelemetryRepository::ensure_schema(&manager).await.unwrap();
        TelemetryRepository::new(manager)
    }

    #[tokio::test]
    async fn telemetry_aggregation_s2() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir).await;
        let device_id = DeviceId::new();
        let start = Utc::now();

        for (i, value) in [20.0, 21.0, 22.0, 23.0, 24.0].into_iter().enumerate() {
            let mut event = TelemetryEvent::new(device_id, TelemetryEventType::SensorData, "temp");
            event.occurred_at = start + Duration::minutes(i as i64);
            event.value = Some(TelemetryValue::Numeric(value));
            repo.create(&event).await.unwrap();
        }

        let end = start + Duration::minutes(5);
        let avg = repo.aggregate(device_id, "temp", start, end, AggregationKind::Avg).await.unwrap();
        assert_eq!(avg, Some(22.0));

        let buckets = repo.time_series(device_id, "temp", start, end, 5).await.unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].count, 5);
        assert_eq!(buckets[0].min, 20.0);
        assert_eq!(buckets[0].max, 24.0);
        assert_eq!(buckets[0].value, 22.0);
    }

    #[tokio::test]
    async fn cleanup_hard_deletes_events_older_than_retention() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir).await;
        let device_id = DeviceId::new();

        let mut old = TelemetryEvent::new(device_id, TelemetryEventType::SensorData, "temp");
        old.occurred_at = Utc::now() - Duration::days(40);
        repo.create(&old).await.unwrap();

        let mut recent = TelemetryEvent::new(device_id, TelemetryEventType::SensorData, "temp");
        recent.occurred_at = Utc::now();
        repo.create(&recent).await.unwrap();

        let removed = repo.cleanup(30).await.unwrap();
        assert_eq!(removed, 1);
        assert!(repo.get(&old.id).await.unwrap().is_none());
        assert!(repo.get(&recent.id).await.unwrap().is_some());
    }
}
