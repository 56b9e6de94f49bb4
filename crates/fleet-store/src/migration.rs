use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::connection::{ConnectionManager, DbKind};
use crate::error::MigrationError;

/// One migration step, named `<id>_<message>.{up,down}.sql` on disk.
/// Revisions form a linear chain via `down_from`; the engine walks parent
/// links rather than trusting file ordering.
#[derive(Debug, Clone)]
pub struct Revision {
    pub id: String,
    pub message: String,
    pub down_from: Option<String>,
    pub up_sql: String,
    pub down_sql: String,
}

pub struct RevisionGraph {
    revisions: HashMap<String, Revision>,
    head: Option<String>,
}

impl RevisionGraph {
    /// Loads every `<id>_<message>.up.sql` / `.down.sql` pair from `dir`
    /// and reconstructs the parent chain from each file's leading
    /// `-- down_from: <id>` marker comment (absent on the root revision).
    pub fn load(dir: &Path) -> Result<Self, MigrationError> {
        let mut revisions = HashMap::new();

        let mut up_files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.to_string_lossy().ends_with(".up.sql"))
            .collect();
        up_files.sort();

        for up_path in up_files {
            let file_name = up_path.file_name().unwrap().to_string_lossy().to_string();
            let stem = file_name.trim_end_matches(".up.sql").to_string();
            let (id, message) = stem
                .split_once('_')
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .unwrap_or((stem.clone(), String::new()));

            let up_sql = std::fs::read_to_string(&up_path)?;
            let down_path = up_path.with_file_name(format!("{stem}.down.sql"));
            let down_sql = std::fs::read_to_string(&down_path).unwrap_or_default();

            let down_from = up_sql
                .lines()
                .find_map(|l| l.trim().strip_prefix("-- down_from:"))
                .map(|s| s.trim().to_string());

            revisions.insert(
                id.clone(),
                Revision {
                    id,
                    message,
                    down_from,
                    up_sql,
                    down_sql,
                },
            );
        }

        // The head is the revision nothing else declares as its
        // `down_from` parent.
        let parent_ids: std::collections::HashSet<&str> = revisions
            .values()
            .filter_map(|r| r.down_from.as_deref())
            .collect();
        let head = revisions
            .keys()
            .find(|id| !parent_ids.contains(id.as_str()))
            .cloned();

        Ok(Self { revisions, head })
    }

    /// Parent chain from the root revision up to and including `target`,
    /// in apply order. `None` target means "every revision, to head".
    pub fn chain_to(&self, target: Option<&str>) -> Result<Vec<&Revision>, MigrationError> {
        let target_id = match target {
            Some(t) => t.to_string(),
            None => self
                .head
                .clone()
                .ok_or_else(|| MigrationError::InvalidGraph("no head revision".to_string()))?,
        };

        let mut chain = Vec::new();
        let mut current = self
            .revisions
            .get(&target_id)
            .ok_or_else(|| MigrationError::RevisionNotFound(target_id.clone()))?;
        chain.push(current);
        while let Some(parent_id) = &current.down_from {
            current = self
                .revisions
                .get(parent_id)
                .ok_or_else(|| MigrationError::RevisionNotFound(parent_id.clone()))?;
            chain.push(current);
        }
        chain.reverse();
        Ok(chain)
    }

    pub fn head(&self) -> Option<&str> {
        self.head.as_deref()
    }
}

/// Abstracts the pre-migration snapshot so the sqlite and postgres paths
/// share one call site: a raw file copy for the embedded database, a
/// `pg_dump` invocation for the networked one.
#[async_trait]
pub trait BackupStrategy: Send + Sync {
    async fn snapshot(&self, label: &str) -> Result<PathBuf, MigrationError>;
}

pub struct SqliteFileBackup {
    pub db_path: PathBuf,
    pub backup_dir: PathBuf,
}

#[async_trait]
impl BackupStrategy for SqliteFileBackup {
    async fn snapshot(&self, label: &str) -> Result<PathBuf, MigrationError> {
        std::fs::create_dir_all(&self.backup_dir)?;
        let dest = self.backup_dir.join(format!("{label}.sqlite3"));
        std::fs::copy(&self.db_path, &dest)
            .map_err(|e| MigrationError::BackupFailed(e.to_string()))?;
        Ok(dest)
    }
}

pub struct PgDumpBackup {
    pub database_url: String,
    pub backup_dir: PathBuf,
}

#[async_trait]
impl BackupStrategy for PgDumpBackup {
    async fn snapshot(&self, label: &str) -> Result<PathBuf, MigrationError> {
        std::fs::create_dir_all(&self.backup_dir)?;
        let dest = self.backup_dir.join(format!("{label}.sql"));
        let status = tokio::process::Command::new("pg_dump")
            .arg(&self.database_url)
            .arg("-f")
            .arg(&dest)
            .status()
            .await
            .map_err(|e| MigrationError::BackupFailed(e.to_string()))?;
        if !status.success() {
            return Err(MigrationError::BackupFailed(format!(
                "pg_dump exited with {status}"
            )));
        }
        Ok(dest)
    }
}

/// Applies/rolls back revisions, bookkeeping progress in a
/// `schema_migrations` table and snapshotting via a [`BackupStrategy`]
/// before any destructive step.
pub struct MigrationEngine {
    manager: ConnectionManager,
    graph: RevisionGraph,
    backup: Box<dyn BackupStrategy>,
}

impl MigrationEngine {
    pub fn new(manager: ConnectionManager, graph: RevisionGraph, backup: Box<dyn BackupStrategy>) -> Self {
        Self { manager, graph, backup }
    }

    pub async fn ensure_bookkeeping_table(&self) -> Result<(), MigrationError> {
        self.manager
            .execute(
                "CREATE TABLE IF NOT EXISTS schema_migrations (
                    revision TEXT PRIMARY KEY,
                    message TEXT NOT NULL,
                    applied_at TIMESTAMP NOT NULL
                )",
            )
            .await
            .map_err(|e| MigrationError::Apply {
                revision: "schema_migrations".to_string(),
                source: sqlx::Error::Configuration(e.to_string().into()),
            })?;
        Ok(())
    }

    async fn applied_revisions(&self) -> Result<Vec<String>, MigrationError> {
        let mut session = self
            .manager
            .session()
            .await
            .map_err(|e| MigrationError::Apply {
                revision: "<connect>".to_string(),
                source: sqlx::Error::Configuration(e.to_string().into()),
            })?;
        let rows: Vec<(String,)> = sqlx::query_as("SELECT revision FROM schema_migrations")
            .fetch_all(&mut *session)
            .await
            .map_err(|e| MigrationError::Apply {
                revision: "<list>".to_string(),
                source: e,
            })?;
        Ok(rows.into_iter().map(|(r,)| r).collect())
    }

    /// Applies every revision up to and including `target` (head if
    /// `None`) that is not already recorded as applied.
    pub async fn upgrade(&self, target: Option<&str>) -> Result<Vec<String>, MigrationError> {
        self.ensure_bookkeeping_table().await?;
        let applied = self.applied_revisions().await?;
        let chain = self.graph.chain_to(target)?;
        let pending: Vec<_> = chain.into_iter().filter(|r| !applied.contains(&r.id)).collect();

        if pending.is_empty() {
            info!("no pending migrations");
            return Ok(Vec::new());
        }

        let label = format!("pre-migrate-{}", Utc::now().timestamp());
        let backup_path = self.backup.snapshot(&label).await?;
        info!(path = %backup_path.display(), "pre-migration snapshot taken");

        let mut applied_now = Vec::new();
        for revision in pending {
            self.manager
                .execute(&revision.up_sql)
                .await
                .map_err(|e| MigrationError::Apply {
                    revision: revision.id.clone(),
                    source: e,
                })?;

            let mut session = self
                .manager
                .session()
                .await
                .map_err(|e| MigrationError::Apply {
                    revision: revision.id.clone(),
                    source: sqlx::Error::Configuration(e.to_string().into()),
                })?;
            sqlx::query("INSERT INTO schema_migrations (revision, message, applied_at) VALUES (?, ?, ?)")
                .bind(&revision.id)
                .bind(&revision.message)
                .bind(Utc::now())
                .execute(&mut *session)
                .await
                .map_err(|e| MigrationError::Apply {
                    revision: revision.id.clone(),
                    source: e,
                })?;

            info!(revision = %revision.id, "migration applied");
            applied_now.push(revision.id.clone());
        }

        Ok(applied_now)
    }

    /// Rolls back to (but not including) `target`, most recent first.
    pub async fn downgrade(&self, target: &str) -> Result<Vec<String>, MigrationError> {
        self.ensure_bookkeeping_table().await?;
        let applied = self.applied_revisions().await?;
        let mut chain = self.graph.chain_to(None)?;
        chain.retain(|r| applied.contains(&r.id) && r.id != target);
        chain.reverse();

        let label = format!("pre-downgrade-{}", Utc::now().timestamp());
        let backup_path = self.backup.snapshot(&label).await?;
        warn!(path = %backup_path.display(), "pre-downgrade snapshot taken");

        let mut rolled_back = Vec::new();
        for revision in chain {
            if revision.down_sql.is_empty() {
                warn!(revision = %revision.id, "no down migration recorded, skipping");
                continue;
            }
            self.manager
                .execute(&revision.down_sql)
                .await
                .map_err(|e| MigrationError::Apply {
                    revision: revision.id.clone(),
                    source: e,
                })?;

            let mut session = self
                .manager
                .session()
                .await
                .map_err(|e| MigrationError::Apply {
                    revision: revision.id.clone(),
                    source: sqlx::Error::Configuration(e.to_string().into()),
                })?;
            sqlx::query("DELETE FROM schema_migrations WHERE revision = ?")
                .bind(&revision.id)
                .execute(&mut *session)
                .await
                .map_err(|e| MigrationError::Apply {
                    revision: revision.id.clone(),
                    source: e,
                })?;

            rolled_back.push(revision.id.clone());
        }
        Ok(rolled_back)
    }

    pub fn head(&self) -> Option<&str> {
        self.graph.head()
    }
}

/// Picks the appropriate [`BackupStrategy`] for the active [`DbKind`].
pub fn default_backup_strategy(kind: DbKind, url: &str, backup_dir: PathBuf) -> Box<dyn BackupStrategy> {
    match kind {
        DbKind::Sqlite => {
            let db_path = PathBuf::from(url.trim_start_matches("sqlite:").trim_start_matches("//"));
            Box::new(SqliteFileBackup { db_path, backup_dir })
        }
        DbKind::Postgres => Box::new(PgDumpBackup {
            database_url: url.to_string(),
            backup_dir,
        }),
    }
}
