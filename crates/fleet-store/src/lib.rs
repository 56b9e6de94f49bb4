//! Connection pooling, health monitoring, generic entity persistence, and
//! schema migration for the fleet control plane's database layer.

pub mod connection;
pub mod error;
pub mod health;
pub mod migration;
pub mod repository;

pub use connection::{with_transaction, ConnectionManager, DbKind, PoolStatistics};
pub use error::{ConnectionError, MigrationError, RepositoryError};
pub use health::{HealthMetrics, HealthMonitor, HealthState};
pub use migration::{
    default_backup_strategy, BackupStrategy, MigrationEngine, PgDumpBackup, Revision, RevisionGraph,
    SqliteFileBackup,
};
pub use fleet_domain::Entity;
pub use repository::{ensure_table, Filter, FilterOp, RepositoryCore};
