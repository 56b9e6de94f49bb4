use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fleet_config::DatabaseConfig;
use sqlx::any::{AnyPoolOptions, AnyQueryResult};
use sqlx::pool::PoolOptions;
use sqlx::{Any, AnyPool, Transaction};
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::ConnectionError;

/// Which SQL dialect the configured URL resolves to. Repositories and the
/// migration engine branch on this where DDL genuinely differs (e.g.
/// `AUTOINCREMENT` vs `GENERATED ALWAYS AS IDENTITY`); ordinary CRUD goes
/// through the dialect-agnostic `sqlx::Any` driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    Sqlite,
    Postgres,
}

impl DbKind {
    pub fn from_url(url: &str) -> Result<Self, ConnectionError> {
        if url.starts_with("sqlite:") {
            Ok(DbKind::Sqlite)
        } else if url.starts_with("postgres:") || url.starts_with("postgresql:") {
            Ok(DbKind::Postgres)
        } else {
            Err(ConnectionError::Connect {
                kind: "unknown",
                source: sqlx::Error::Configuration(format!("unrecognized database url scheme: {url}").into()),
            })
        }
    }
}

impl fmt::Display for DbKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbKind::Sqlite => write!(f, "sqlite"),
            DbKind::Postgres => write!(f, "postgres"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PoolStatistics {
    pub connections_created: u64,
    pub connections_closed: u64,
    pub checkout_count: u64,
    pub checkout_failures: u64,
}

struct Inner {
    pool: AnyPool,
    kind: DbKind,
    url: String,
    stats: RwLock<PoolStatistics>,
}

/// Owns the connection pool and mediates every access to it: session
/// checkout, transaction scoping, retrying connects, and pool recreation
/// after a sustained outage. Mirrors the teacher's `PostgresStore::connect`
/// shape, generalized to both embedded and networked backends through
/// `sqlx::Any`.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<RwLock<Option<Inner>>>,
    config: DatabaseConfig,
}

impl ConnectionManager {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(None)),
            config,
        }
    }

    pub async fn initialize(&self) -> Result<(), ConnectionError> {
        sqlx::any::install_default_drivers();
        let kind = DbKind::from_url(&self.config.url)?;
        let pool = build_pool(&self.config).await?;

        let mut guard = self.inner.write().await;
        *guard = Some(Inner {
            pool,
            kind,
            url: self.config.url.clone(),
            stats: RwLock::new(PoolStatistics::default()),
        });
        info!(kind = %kind, "connection manager initialized");
        Ok(())
    }

    pub async fn shutdown(&self) {
        let mut guard = self.inner.write().await;
        if let Some(inner) = guard.take() {
            inner.pool.close().await;
            info!("connection manager shut down");
        }
    }

    async fn pool(&self) -> Result<AnyPool, ConnectionError> {
        let guard = self.inner.read().await;
        guard
            .as_ref()
            .map(|i| i.pool.clone())
            .ok_or(ConnectionError::NotInitialized)
    }

    /// Checks out a connection for a single statement or query sequence
    /// with no transactional guarantees beyond what the driver gives per
    /// statement.
    pub async fn session(&self) -> Result<sqlx::pool::PoolConnection<Any>, ConnectionError> {
        let pool = self.pool().await?;
        {
            let guard = self.inner.read().await;
            if let Some(inner) = guard.as_ref() {
                inner.stats.write().await.checkout_count += 1;
            }
        }
        pool.acquire().await.map_err(|e| {
            ConnectionError::PoolExhausted { attempts: 1 }.tap_log(&e)
        })
    }

    /// Starts a transaction. Callers must explicitly `commit`/`rollback`;
    /// prefer [`with_transaction`] unless you need manual control.
    pub async fn begin(&self) -> Result<Transaction<'static, Any>, ConnectionError> {
        let pool = self.pool().await?;
        Ok(pool.begin().await?)
    }

    pub async fn execute(&self, sql: &str) -> Result<AnyQueryResult, ConnectionError> {
        let pool = self.pool().await?;
        Ok(sqlx::query(sql).execute(&pool).await?)
    }

    pub async fn check_connection(&self) -> Result<(), ConnectionError> {
        let pool = self.pool().await?;
        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| ConnectionError::HealthCheckFailed(e.to_string()))?;
        Ok(())
    }

    /// Retries `check_connection` with linear backoff, honoring
    /// `database.max_retries`/`retry_delay_secs`. Used at startup and by
    /// the health monitor when recovering from an outage.
    pub async fn test_connection_with_retry(&self) -> Result<(), ConnectionError> {
        let mut last_err = None;
        for attempt in 0..=self.config.max_retries {
            match self.check_connection().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(attempt, error = %e, "connection check failed");
                    last_err = Some(e);
                    if attempt < self.config.max_retries {
                        sleep(Duration::from_secs(self.config.retry_delay_secs)).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or(ConnectionError::NotInitialized))
    }

    /// Tears down and rebuilds the pool in place, used after failover to a
    /// replacement URL or to recover from a poisoned pool.
    pub async fn recreate_engine(&self, new_url: Option<&str>) -> Result<(), ConnectionError> {
        let mut cfg = self.config.clone();
        if let Some(url) = new_url {
            cfg.url = url.to_string();
        }
        let kind = DbKind::from_url(&cfg.url)?;
        let pool = build_pool(&cfg).await?;

        let mut guard = self.inner.write().await;
        if let Some(old) = guard.take() {
            old.pool.close().await;
        }
        *guard = Some(Inner {
            pool,
            kind,
            url: cfg.url.clone(),
            stats: RwLock::new(PoolStatistics::default()),
        });
        info!(kind = %kind, "connection engine recreated");
        Ok(())
    }

    pub async fn info(&self) -> Result<(DbKind, String), ConnectionError> {
        let guard = self.inner.read().await;
        let inner = guard.as_ref().ok_or(ConnectionError::NotInitialized)?;
        Ok((inner.kind, inner.url.clone()))
    }

    pub async fn statistics(&self) -> PoolStatistics {
        let guard = self.inner.read().await;
        match guard.as_ref() {
            Some(inner) => inner.stats.read().await.clone(),
            None => PoolStatistics::default(),
        }
    }

    pub async fn kind(&self) -> Result<DbKind, ConnectionError> {
        Ok(self.info().await?.0)
    }
}

async fn build_pool(config: &DatabaseConfig) -> Result<AnyPool, ConnectionError> {
    let started = Instant::now();
    let pool = PoolOptions::<Any>::new()
        .max_connections(config.pool_size + config.max_overflow)
        .acquire_timeout(Duration::from_secs(config.pool_timeout_secs))
        .max_lifetime(Duration::from_secs(config.pool_recycle_secs))
        .test_before_acquire(config.pool_pre_ping)
        .connect(&config.url)
        .await
        .map_err(|e| ConnectionError::Connect {
            kind: if config.is_embedded() { "sqlite" } else { "postgres" },
            source: e,
        })?;
    info!(elapsed_ms = started.elapsed().as_millis() as u64, "database pool established");
    Ok(pool)
}

/// Runs `body` inside a transaction, committing on `Ok` and rolling back on
/// `Err` or panic-unwind. This is the one sanctioned way to get
/// multi-statement atomicity out of the store; nothing outside this
/// module calls `begin`/`commit` directly except the migration engine.
pub async fn with_transaction<F, T, E>(
    manager: &ConnectionManager,
    body: F,
) -> Result<T, E>
where
    F: for<'c> FnOnce(
        &'c mut Transaction<'static, Any>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<T, E>> + Send + 'c>>,
    E: From<ConnectionError>,
{
    let mut tx = manager.begin().await.map_err(E::from)?;
    match body(&mut tx).await {
        Ok(value) => {
            tx.commit().await.map_err(ConnectionError::from).map_err(E::from)?;
            Ok(value)
        }
        Err(e) => {
            let _ = tx.rollback().await;
            Err(e)
        }
    }
}

trait TapLog {
    fn tap_log(self, source: &sqlx::Error) -> Self;
}

impl TapLog for ConnectionError {
    fn tap_log(self, source: &sqlx::Error) -> Self {
        warn!(error = %source, "pool checkout failed");
        self
    }
}
