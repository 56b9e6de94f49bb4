use std::collections::HashMap;

use chrono::{DateTime, Utc};
use fleet_domain::{Device, DeviceGroupId, DeviceId, DeviceStatus, DeviceType};
use fleet_store::{ensure_table, ConnectionManager, Filter, FilterOp, RepositoryCore, RepositoryError};

/// Device CRUD plus the lookups the fleet dashboard and health sweeps
/// actually need: by status, by group, stale-heartbeat, and free-text
/// search over name/serial.
pub struct DeviceRepository {
    core: RepositoryCore<Device>,
}

impl DeviceRepository {
    pub fn new(manager: ConnectionManager) -> Self {
        Self {
            core: RepositoryCore::new(manager),
        }
    }

    pub async fn ensure_schema(manager: &ConnectionManager) -> Result<(), RepositoryError> {
        ensure_table(manager, "devices").await
    }

    pub async fn create(&self, device: &Device) -> Result<(), RepositoryError> {
        device.validate()?;
        self.core.create(device).await
    }

    pub async fn get(&self, id: &DeviceId) -> Result<Option<Device>, RepositoryError> {
        self.core.get(id).await
    }

    pub async fn get_required(&self, id: &DeviceId) -> Result<Device, RepositoryError> {
        self.core.get_required(id).await
    }

    pub async fn update(&self, device: &mut Device) -> Result<(), RepositoryError> {
        device.validate()?;
        self.core.update(device).await
    }

    pub async fn delete(&self, id: &DeviceId) -> Result<(), RepositoryError> {
        self.core.delete(id).await
    }

    pub async fn list(&self, filter: &Filter) -> Result<Vec<Device>, RepositoryError> {
        self.core.list(filter).await
    }

    pub async fn list_by_status(&self, status: DeviceStatus) -> Result<Vec<Device>, RepositoryError> {
        let filter = Filter::new().eq("status", status);
        self.core.list(&filter).await
    }

    pub async fn list_by_type(&self, device_type: DeviceType) -> Result<Vec<Device>, RepositoryError> {
        let filter = Filter::new().eq("device_type", device_type);
        self.core.list(&filter).await
    }

    pub async fn list_by_group(&self, group_id: DeviceGroupId) -> Result<Vec<Device>, RepositoryError> {
        let filter = Filter::new().eq("group_id", group_id);
        self.core.list(&filter).await
    }

    /// Devices whose last heartbeat is older than `cutoff` (or that never
    /// reported one) — the set the health sweep flips to offline.
    pub async fn list_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<Device>, RepositoryError> {
        let all = self
            .core
            .list(&Filter::new().eq("status", DeviceStatus::Online))
            .await?;
        Ok(all
            .into_iter()
            .filter(|d| d.last_heartbeat.map_or(true, |t| t < cutoff))
            .collect())
    }

    pub async fn search_by_name(&self, needle: &str) -> Result<Vec<Device>, RepositoryError> {
        self.core.search("name", needle).await
    }

    pub async fn count_by_type(&self, device_type: DeviceType) -> Result<u64, RepositoryError> {
        self.core.count(&Filter::new().eq("device_type", device_type)).await
    }

    pub async fn get_by_ip(&self, ip: &str) -> Result<Option<Device>, RepositoryError> {
        let filter = Filter::new().op("ip_address", FilterOp::Eq(serde_json::json!(ip)));
        Ok(self.core.list(&filter).await?.into_iter().next())
    }

    pub async fn get_by_mac(&self, mac: &str) -> Result<Option<Device>, RepositoryError> {
        let filter = Filter::new().op("mac_address", FilterOp::Eq(serde_json::json!(mac)));
        Ok(self.core.list(&filter).await?.into_iter().next())
    }

    pub async fn get_by_serial(&self, serial: &str) -> Result<Option<Device>, RepositoryError> {
        let filter = Filter::new().op("serial_number", FilterOp::Eq(serde_json::json!(serial)));
        Ok(self.core.list(&filter).await?.into_iter().next())
    }

    pub async fn list_online(&self) -> Result<Vec<Device>, RepositoryError> {
        self.list_by_status(DeviceStatus::Online).await
    }

    pub async fn list_offline(&self) -> Result<Vec<Device>, RepositoryError> {
        self.list_by_status(DeviceStatus::Offline).await
    }

    /// Devices with a known location within `radius_km` of `(lat, lon)`,
    /// nearest first.
    pub async fn list_by_location(&self, lat: f64, lon: f64, radius_km: f64) -> Result<Vec<Device>, RepositoryError> {
        let all = self.core.list(&Filter::new()).await?;
        let mut within: Vec<(f64, Device)> = all
            .into_iter()
            .filter_map(|d| {
                let (dlat, dlon) = (d.location.lat?, d.location.lon?);
                let distance = haversine_km(lat, lon, dlat, dlon);
                (distance <= radius_km).then_some((distance, d))
            })
            .collect();
        within.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(within.into_iter().map(|(_, d)| d).collect())
    }

    pub async fn list_unhealthy(&self, threshold: f64) -> Result<Vec<Device>, RepositoryError> {
        let all = self.core.list(&Filter::new()).await?;
        let mut out: Vec<Device> = all
            .into_iter()
            .filter(|d| d.health_score.map_or(false, |h| h < threshold))
            .collect();
        out.sort_by(|a, b| a.health_score.partial_cmp(&b.health_score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(out)
    }

    pub async fn list_low_battery(&self, threshold: f64) -> Result<Vec<Device>, RepositoryError> {
        let all = self.core.list(&Filter::new()).await?;
        let mut out: Vec<Device> = all
            .into_iter()
            .filter(|d| d.battery_level.map_or(false, |b| b < threshold))
            .collect();
        out.sort_by(|a, b| a.battery_level.partial_cmp(&b.battery_level).unwrap_or(std::cmp::Ordering::Equal));
        Ok(out)
    }

    /// Counts by status and type, plus a health-score summary across all
    /// devices that report one.
    pub async fn statistics(&self) -> Result<DeviceStatistics, RepositoryError> {
        let all = self.core.list(&Filter::new()).await?;
        let mut by_status: HashMap<String, u64> = HashMap::new();
        let mut by_type: HashMap<String, u64> = HashMap::new();
        let mut scores = Vec::new();
        for d in &all {
            *by_status.entry(d.status.to_string()).or_default() += 1;
            *by_type.entry(d.device_type.to_string()).or_default() += 1;
            if let Some(h) = d.health_score {
                scores.push(h);
            }
        }
        let health = if scores.is_empty() {
            (None, None, None)
        } else {
            let sum: f64 = scores.iter().sum();
            let min = scores.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            (Some(sum / scores.len() as f64), Some(min), Some(max))
        };
        Ok(DeviceStatistics {
            total: all.len() as u64,
            by_status,
            by_type,
            avg_health: health.0,
            min_health: health.1,
            max_health: health.2,
        })
    }

    /// Repository-level counterpart to [`Device::record_heartbeat`] — loads,
    /// flips status if needed, persists. Satisfies invariant §8.3.
    pub async fn update_heartbeat(&self, id: &DeviceId) -> Result<Device, RepositoryError> {
        let mut device = self.core.get_required(id).await?;
        device.record_heartbeat(Utc::now());
        self.core.update(&mut device).await?;
        Ok(device)
    }

    pub async fn update_last_seen(&self, id: &DeviceId) -> Result<Device, RepositoryError> {
        let mut device = self.core.get_required(id).await?;
        let now = Utc::now();
        device.last_seen = Some(now);
        self.core.update(&mut device).await?;
        Ok(device)
    }

    /// Bulk-transitions the given devices to offline.
    pub async fn mark_offline(&self, ids: &[DeviceId]) -> Result<u64, RepositoryError> {
        let mut updated = 0;
        for id in ids {
            let mut device = self.core.get_required(id).await?;
            device.status = DeviceStatus::Offline;
            self.core.update(&mut device).await?;
            updated += 1;
        }
        Ok(updated)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceStatistics {
    pub total: u64,
    pub by_status: HashMap<String, u64>,
    pub by_type: HashMap<String, u64>,
    pub avg_health: Option<f64>,
    pub min_health: Option<f64>,
    pub max_health: Option<f64>,
}

/// Great-circle distance in kilometers between two lat/lon points.
fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_config::DatabaseConfig;
    use tempfile::TempDir;

    async fn repo(dir: &TempDir) -> DeviceRepository {
        let path = dir.path().join("devices.db");
        let config = DatabaseConfig {
            url: format!("sqlite://{}?mode=rwc", path.display()),
            pool_size: 1,
            max_overflow: 0,
            ..DatabaseConfig::default()
        };
        let manager = ConnectionManager::new(config);
        manager.initialize().await.unwrap();
        DeviceRepository::ensure_schema(&manager).await.unwrap();
        DeviceRepository::new(manager)
    }

    #[tokio::test]
    async fn create_get_update_delete_round_trip() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir).await;

        let mut device = Device::new("sensor-1", DeviceType::Sensor);
        repo.create(&device).await.unwrap();

        let fetched = repo.get(&device.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "sensor-1");

        device.status = DeviceStatus::Online;
        repo.update(&mut device).await.unwrap();
        let fetched = repo.get_required(&device.id).await.unwrap();
        assert_eq!(fetched.status, DeviceStatus::Online);

        repo.delete(&device.id).await.unwrap();
        assert!(repo.get(&device.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_by_status_and_type_filter_independently() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir).await;

        let mut online = Device::new("gateway-1", DeviceType::Gateway);
        online.status = DeviceStatus::Online;
        repo.create(&online).await.unwrap();

        let mut offline = Device::new("sensor-2", DeviceType::Sensor);
        offline.status = DeviceStatus::Offline;
        repo.create(&offline).await.unwrap();

        let online_devices = repo.list_by_status(DeviceStatus::Online).await.unwrap();
        assert_eq!(online_devices.len(), 1);
        assert_eq!(online_devices[0].id, online.id);

        let gateways = repo.list_by_type(DeviceType::Gateway).await.unwrap();
        assert_eq!(gateways.len(), 1);
        assert_eq!(gateways[0].id, online.id);
    }

    #[tokio::test]
    async fn rejects_out_of_range_health_score() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir).await;

        let mut device = Device::new("bad-sensor", DeviceType::Sensor);
        device.health_score = Some(1.5);
        assert!(repo.create(&device).await.is_err());
    }

    #[tokio::test]
    async fn device_lifecycle_s1() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir).await;

        let mut device = Device::new("T1", DeviceType::Sensor);
        device.status = DeviceStatus::Offline;
        device.ip_address = Some("192.168.1.100".to_string());
        let start = Utc::now();
        repo.create(&device).await.unwrap();

        assert!(!device.is_online());
        // is_healthy requires status ∈ {online, maintenance}; a freshly
        // created offline device is not healthy until its first heartbeat.
        assert!(!device.is_healthy());

        let updated = repo.update_heartbeat(&device.id).await.unwrap();
        assert_eq!(updated.status, DeviceStatus::Online);
        assert!(updated.is_online());
        assert!(updated.last_heartbeat.unwrap() >= start);

        let found = repo.get_by_ip("192.168.1.100").await.unwrap().unwrap();
        assert_eq!(found.id, device.id);
    }

    #[tokio::test]
    async fn list_by_location_orders_by_distance_and_respects_radius() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir).await;

        let mut near = Device::new("near", DeviceType::Sensor);
        near.location.lat = Some(40.7128);
        near.location.lon = Some(-74.0060); // New York
        repo.create(&near).await.unwrap();

        let mut far = Device::new("far", DeviceType::Sensor);
        far.location.lat = Some(34.0522);
        far.location.lon = Some(-118.2437); // Los Angeles
        repo.create(&far).await.unwrap();

        let mut unplaced = Device::new("unplaced", DeviceType::Sensor);
        unplaced.location.lat = None;
        repo.create(&unplaced).await.unwrap();

        let nearby = repo.list_by_location(40.7128, -74.0060, 50.0).await.unwrap();
        assert_eq!(nearby.len(), 1);
        assert_eq!(nearby[0].id, near.id);

        let continental = repo.list_by_location(40.7128, -74.0060, 5000.0).await.unwrap();
        assert_eq!(continental.len(), 2);
        assert_eq!(continental[0].id, near.id);
    }

    #[tokio::test]
    async fn statistics_aggregates_counts_and_health() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir).await;

        let mut a = Device::new("a", DeviceType::Sensor);
        a.status = DeviceStatus::Online;
        a.health_score = Some(0.9);
        repo.create(&a).await.unwrap();

        let mut b = Device::new("b", DeviceType::Gateway);
        b.status = DeviceStatus::Offline;
        b.health_score = Some(0.5);
        repo.create(&b).await.unwrap();

        let stats = repo.statistics().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_status["online"], 1);
        assert_eq!(stats.by_type["gateway"], 1);
        assert_eq!(stats.min_health, Some(0.5));
        assert_eq!(stats.max_health, Some(0.9));
    }

    #[tokio::test]
    async fn mark_offline_bulk_updates_status() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir).await;

        let mut a = Device::new("a", DeviceType::Sensor);
        a.status = DeviceStatus::Online;
        repo.create(&a).await.unwrap();
        let mut b = Device::new("b", DeviceType::Sensor);
        b.status = DeviceStatus::Online;
        repo.create(&b).await.unwrap();

        let updated = repo.mark_offline(&[a.id, b.id]).await.unwrap();
        assert_eq!(updated, 2);
        assert_eq!(repo.get_required(&a.id).await.unwrap().status, DeviceStatus::Offline);
        assert_eq!(repo.get_required(&b.id).await.unwrap().status, DeviceStatus::Offline);
    }
}
