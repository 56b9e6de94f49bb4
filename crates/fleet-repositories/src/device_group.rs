use fleet_domain::{DeviceGroup, DeviceGroupId, DeviceStatus};
use fleet_store::{ensure_table, ConnectionManager, Filter, RepositoryCore, RepositoryError};

use crate::device::DeviceRepository;

pub struct DeviceGroupRepository {
    core: RepositoryCore<DeviceGroup>,
}

impl DeviceGroupRepository {
    pub fn new(manager: ConnectionManager) -> Self {
        Self {
            core: RepositoryCore::new(manager),
        }
    }

    pub async fn ensure_schema(manager: &ConnectionManager) -> Result<(), RepositoryError> {
        ensure_table(manager, "device_groups").await
    }

    pub async fn create(&self, group: &DeviceGroup) -> Result<(), RepositoryError> {
        group.validate()?;
        self.core.create(group).await
    }

    pub async fn get(&self, id: &DeviceGroupId) -> Result<Option<DeviceGroup>, RepositoryError> {
        self.core.get(id).await
    }

    pub async fn list_children(&self, parent_id: DeviceGroupId) -> Result<Vec<DeviceGroup>, RepositoryError> {
        self.core.list(&Filter::new().eq("parent_id", parent_id)).await
    }

    /// Top-level groups, i.e. those with no `parent_id`.
    pub async fn list_roots(&self) -> Result<Vec<DeviceGroup>, RepositoryError> {
        let all = self.core.list(&Filter::new()).await?;
        Ok(all.into_iter().filter(|g| g.parent_id.is_none()).collect())
    }

    pub async fn list_by_type(&self, group_type: &str) -> Result<Vec<DeviceGroup>, RepositoryError> {
        let all = self.core.list(&Filter::new()).await?;
        Ok(all
            .into_iter()
            .filter(|g| g.group_type.as_deref() == Some(group_type))
            .collect())
    }

    pub async fn list_dynamic(&self) -> Result<Vec<DeviceGroup>, RepositoryError> {
        self.core.list(&Filter::new().eq("dynamic", true)).await
    }

    /// Walks parent links from `id` up to its root, returning root-to-leaf.
    pub async fn hierarchy(&self, id: &DeviceGroupId) -> Result<Vec<DeviceGroup>, RepositoryError> {
        let mut chain = Vec::new();
        let mut current = Some(*id);
        while let Some(current_id) = current {
            let group = self.core.get_required(&current_id).await?;
            current = group.parent_id;
            chain.push(group);
        }
        chain.reverse();
        Ok(chain)
    }

    /// Eagerly recomputes `device_count`/`active_device_count` from the
    /// device table and persists them — the resolved approach to the
    /// device-count maintenance question: maintained on write, never
    /// recomputed lazily at read time.
    pub async fn recompute_counts(
        &self,
        id: &DeviceGroupId,
        devices: &DeviceRepository,
    ) -> Result<DeviceGroup, RepositoryError> {
        let mut group = self.core.get_required(id).await?;
        let members = devices.list_by_group(*id).await?;
        let active = members.iter().filter(|d| d.is_online()).count() as u64;
        group.set_counts(members.len() as u64, active)?;
        self.core.update(&mut group).await?;
        Ok(group)
    }

    pub async fn delete(&self, id: &DeviceGroupId) -> Result<(), RepositoryError> {
        self.core.delete(id).await
    }
}

/// Membership criteria evaluation for dynamic groups is intentionally
/// simple: a flat map of device-field equality checks, evaluated against
/// every candidate device. Rich query operators belong to the filter DSL
/// in [`fleet_store::Filter`], not here.
pub fn matches_dynamic_criteria(criteria: &serde_json::Value, status: DeviceStatus) -> bool {
    match criteria.get("status").and_then(|v| v.as_str()) {
        Some(expected) => expected == status.to_string(),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_config::DatabaseConfig;
    use tempfile::TempDir;

    async fn repo(dir: &TempDir) -> DeviceGroupRepository {
        let path = dir.path().join("device_groups.db");
        let config = DatabaseConfig {
            url: format!("sqlite://{}?mode=rwc", path.display()),
            pool_size: 1,
            max_overflow: 0,
            ..DatabaseConfig::default()
        };
        let manager = ConnectionManager::new(config);
        manager.initialize().await.unwrap();
        DeviceGroupRepository::ensure_schema(&manager).await.unwrap();
        DeviceGroupRepository::new(manager)
    }

    #[tokio::test]
    async fn list_roots_and_list_by_type_filter_correctly() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir).await;

        let mut root = DeviceGroup::new("hq-fleet");
        root.group_type = Some("fleet".into());
        repo.create(&root).await.unwrap();

        let mut child = DeviceGroup::new("hq-fleet-east");
        child.parent_id = Some(root.id);
        child.group_type = Some("region".into());
        repo.create(&child).await.unwrap();

        let roots = repo.list_roots().await.unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].id, root.id);

        assert_eq!(repo.list_by_type("fleet").await.unwrap().len(), 1);
        assert_eq!(repo.list_by_type("region").await.unwrap().len(), 1);
        assert_eq!(repo.list_by_type("nonexistent").await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn list_dynamic_returns_only_dynamic_groups() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir).await;

        let mut dynamic = DeviceGroup::new("low-battery-devices");
        dynamic.dynamic = true;
        repo.create(&dynamic).await.unwrap();
        repo.create(&DeviceGroup::new("static-group")).await.unwrap();

        let groups = repo.list_dynamic().await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].id, dynamic.id);
    }

    #[tokio::test]
    async fn hierarchy_walks_root_to_leaf() {
        let dir = TempDir::new().unwrap();
        let repo = repo(&dir).await;

        let root = DeviceGroup::new("root");
        repo.create(&root).await.unwrap();
        let mut mid = DeviceGroup::new("mid");
        mid.parent_id = Some(root.id);
        repo.create(&mid).await.unwrap();
        let mut leaf = DeviceGroup::new("leaf");
        leaf.parent_id = Some(mid.id);
        repo.create(&leaf).await.unwrap();

        let chain = repo.hierarchy(&leaf.id).await.unwrap();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0].id, root.id);
        assert_eq!(chain[1].id, mid.id);
        assert_eq!(chain[2].id, leaf.id);
    }
}
