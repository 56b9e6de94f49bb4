use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to connect to {kind} database: {source}")]
    Connect {
        kind: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("database not initialized; call initialize() before use")]
    NotInitialized,

    #[error("connection pool exhausted after {attempts} attempt(s)")]
    PoolExhausted { attempts: u32 },

    #[error("health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("query error: {0}")]
    Query(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("entity not found: {entity} {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("domain validation failed: {0}")]
    Domain(#[from] fleet_domain::DomainError),
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("revision graph has a cycle or multiple heads: {0}")]
    InvalidGraph(String),

    #[error("revision {0} not found")]
    RevisionNotFound(String),

    #[error("backup failed: {0}")]
    BackupFailed(String),

    #[error("migration {revision} failed: {source}")]
    Apply {
        revision: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
