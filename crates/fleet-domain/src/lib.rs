//! Core entity types for the fleet control plane: devices, telemetry,
//! analytics, users, groups, alerts, and audit logs.

pub mod alert;
pub mod analytics;
pub mod audit_log;
pub mod device;
pub mod device_group;
pub mod entity;
pub mod error;
pub mod ids;
pub mod telemetry;
pub mod user;

pub use alert::{Alert, AlertSeverity, AlertStatus};
pub use analytics::{AggregationKind, Analytics, AnalyticsScope, StatisticalSummary};
pub use audit_log::{AuditAction, AuditLog};
pub use device::{Device, DeviceLocation, DeviceStatus, DeviceType};
pub use device_group::DeviceGroup;
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use ids::{AlertId, AnalyticsId, AuditLogId, DeviceGroupId, DeviceId, TelemetryEventId, UserId};
pub use telemetry::{TelemetryEvent, TelemetryEventType, TelemetryValue};
pub use user::{hash_password, verify_password, User, UserRole, UserStatus};
