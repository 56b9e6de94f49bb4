//! One repository per domain entity, each a thin specialization of
//! `fleet_store::RepositoryCore` with the query shapes that entity
//! actually needs.

pub mod alert;
pub mod analytics;
pub mod audit_log;
pub mod device;
pub mod device_group;
pub mod telemetry;
pub mod user;

pub use alert::{AlertRepository, AlertStatistics};
pub use analytics::{AnalyticsRepository, AnalyticsSummary};
pub use audit_log::{AuditLogRepository, AuditLogStatistics};
pub use device::{DeviceRepository, DeviceStatistics};
pub use device_group::{matches_dynamic_criteria, DeviceGroupRepository};
pub use telemetry::{TelemetryBucket, TelemetryRepository, TelemetryStatistics};
pub use user::{UserRepository, DEFAULT_LOCKOUT_SECONDS, DEFAULT_MAX_ATTEMPTS};
