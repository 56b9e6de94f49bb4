use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Bound satisfied by every persisted domain entity: a stable id, a table
/// name, and the soft-delete/timestamp convention the generic storage
/// layer manages without needing per-entity SQL.
///
/// Lives here (rather than in the storage crate) so impls for `Device`,
/// `TelemetryEvent`, and friends stay next to the types they describe —
/// the storage crate only ever sees `T: Entity`, never a concrete type.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + Unpin + 'static {
    const TABLE: &'static str;
    type Id: ToString + Clone + Send + Sync;

    fn id(&self) -> Self::Id;
    fn created_at(&self) -> DateTime<Utc>;
    fn updated_at(&self) -> DateTime<Utc>;
    fn set_updated_at(&mut self, at: DateTime<Utc>);
    fn is_deleted(&self) -> bool;
    fn mark_deleted(&mut self, at: DateTime<Utc>);
}

macro_rules! impl_entity {
    ($ty:ty, $table:literal, $id:ty) => {
        impl Entity for $ty {
            const TABLE: &'static str = $table;
            type Id = $id;

            fn id(&self) -> Self::Id {
                self.id
            }

            fn created_at(&self) -> DateTime<Utc> {
                self.created_at
            }

            fn updated_at(&self) -> DateTime<Utc> {
                self.updated_at
            }

            fn set_updated_at(&mut self, at: DateTime<Utc>) {
                self.updated_at = at;
            }

            fn is_deleted(&self) -> bool {
                self.deleted
            }

            fn mark_deleted(&mut self, at: DateTime<Utc>) {
                self.deleted = true;
                self.deleted_at = Some(at);
                self.updated_at = at;
            }
        }
    };
}

impl_entity!(crate::device::Device, "devices", crate::ids::DeviceId);
impl_entity!(
    crate::telemetry::TelemetryEvent,
    "telemetry_events",
    crate::ids::TelemetryEventId
);
impl_entity!(crate::analytics::Analytics, "analytics", crate::ids::AnalyticsId);
impl_entity!(crate::user::User, "users", crate::ids::UserId);
impl_entity!(
    crate::device_group::DeviceGroup,
    "device_groups",
    crate::ids::DeviceGroupId
);
impl_entity!(crate::alert::Alert, "alerts", crate::ids::AlertId);
impl_entity!(crate::audit_log::AuditLog, "audit_logs", crate::ids::AuditLogId);
