use std::collections::HashMap;
use std::marker::PhantomData;

use chrono::Utc;
use fleet_domain::Entity;
use serde::Serialize;
use sqlx::any::AnyRow;
use sqlx::{Any, QueryBuilder, Row};

use crate::connection::ConnectionManager;
use crate::error::RepositoryError;

/// Comparison applied to a single filter value. Mirrors the map-with-ops
/// filter DSL: scalar values mean equality, sequences mean `IN`, and a map
/// selects one of these explicitly.
#[derive(Debug, Clone)]
pub enum FilterOp {
    Eq(serde_json::Value),
    Ne(serde_json::Value),
    Gt(serde_json::Value),
    Gte(serde_json::Value),
    Lt(serde_json::Value),
    Lte(serde_json::Value),
    Like(String),
    ILike(String),
    In(Vec<serde_json::Value>),
}

/// A dynamic filter set keyed by JSON field path within the entity's
/// serialized form (e.g. `"status"`, `"location.lat"`).
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub(crate) clauses: HashMap<String, FilterOp>,
    pub include_deleted: bool,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub order_by: Option<(String, bool)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Serialize) -> Self {
        self.clauses
            .insert(field.into(), FilterOp::Eq(serde_json::to_value(value).unwrap()));
        self
    }

    pub fn op(mut self, field: impl Into<String>, op: FilterOp) -> Self {
        self.clauses.insert(field.into(), op);
        self
    }

    pub fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: u32) -> Self {
        self.offset = Some(n);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, descending: bool) -> Self {
        self.order_by = Some((field.into(), descending));
        self
    }

    pub fn with_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    fn matches(&self, value: &serde_json::Value) -> bool {
        self.clauses.iter().all(|(field, op)| {
            let actual = field_path(value, field);
            match (op, actual) {
                (FilterOp::Eq(expected), Some(actual)) => actual == expected,
                (FilterOp::Ne(expected), Some(actual)) => actual != expected,
                (FilterOp::Gt(expected), Some(actual)) => compare(&actual, expected, |o| o.is_gt()),
                (FilterOp::Gte(expected), Some(actual)) => compare(&actual, expected, |o| o.is_ge()),
                (FilterOp::Lt(expected), Some(actual)) => compare(&actual, expected, |o| o.is_lt()),
                (FilterOp::Lte(expected), Some(actual)) => compare(&actual, expected, |o| o.is_le()),
                (FilterOp::Like(pattern), Some(actual)) => like_match(&actual, pattern, true),
                (FilterOp::ILike(pattern), Some(actual)) => like_match(&actual, pattern, false),
                (FilterOp::In(values), Some(actual)) => values.contains(&actual),
                _ => false,
            }
        })
    }
}

fn field_path(value: &serde_json::Value, path: &str) -> Option<serde_json::Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current.clone())
}

fn compare(
    actual: &serde_json::Value,
    expected: &serde_json::Value,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> bool {
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b).map(accept).unwrap_or(false),
        _ => match (actual.as_str(), expected.as_str()) {
            (Some(a), Some(b)) => accept(a.cmp(b)),
            _ => false,
        },
    }
}

fn like_match(actual: &serde_json::Value, pattern: &str, case_sensitive: bool) -> bool {
    let Some(actual) = actual.as_str() else { return false };
    let needle = pattern.trim_matches('%');
    if case_sensitive {
        actual.contains(needle)
    } else {
        actual.to_lowercase().contains(&needle.to_lowercase())
    }
}

/// Generic CRUD core over a one-table-per-entity, JSON-blob-per-row
/// layout — each table is `(id TEXT PRIMARY KEY, data TEXT NOT NULL,
/// created_at, updated_at, deleted INTEGER)`. Column-level filtering on
/// `id`/`created_at`/`deleted` is pushed into SQL; everything else in the
/// filter DSL is applied to the deserialized row, which keeps one code
/// path portable across the sqlite/postgres backends selected at runtime.
pub struct RepositoryCore<T: Entity> {
    manager: ConnectionManager,
    _marker: PhantomData<T>,
}

impl<T: Entity> RepositoryCore<T> {
    pub fn new(manager: ConnectionManager) -> Self {
        Self {
            manager,
            _marker: PhantomData,
        }
    }

    pub async fn create(&self, entity: &T) -> Result<(), RepositoryError> {
        let mut session = self.manager.session().await?;
        let json = serde_json::to_string(entity).map_err(|e| RepositoryError::Constraint(e.to_string()))?;
        sqlx::query(&format!(
            "INSERT INTO {} (id, data, created_at, updated_at, deleted) VALUES (?, ?, ?, ?, ?)",
            T::TABLE
        ))
        .bind(entity.id().to_string())
        .bind(json)
        .bind(entity.created_at())
        .bind(entity.updated_at())
        .bind(entity.is_deleted())
        .execute(&mut *session)
        .await?;
        Ok(())
    }

    pub async fn get(&self, id: &T::Id) -> Result<Option<T>, RepositoryError> {
        let mut session = self.manager.session().await?;
        let row: Option<AnyRow> = sqlx::query(&format!(
            "SELECT data FROM {} WHERE id = ? AND deleted = ?",
            T::TABLE
        ))
        .bind(id.to_string())
        .bind(false)
        .fetch_optional(&mut *session)
        .await?;

        row.map(|r| decode_row(&r)).transpose()
    }

    pub async fn get_required(&self, id: &T::Id) -> Result<T, RepositoryError> {
        self.get(id).await?.ok_or_else(|| RepositoryError::NotFound {
            entity: T::TABLE,
            id: id.to_string(),
        })
    }

    pub async fn exists(&self, id: &T::Id) -> Result<bool, RepositoryError> {
        Ok(self.get(id).await?.is_some())
    }

    pub async fn list(&self, filter: &Filter) -> Result<Vec<T>, RepositoryError> {
        let mut session = self.manager.session().await?;
        let mut qb: QueryBuilder<'_, Any> = QueryBuilder::new(format!("SELECT data FROM {} WHERE 1=1", T::TABLE));
        if !filter.include_deleted {
            qb.push(" AND deleted = ").push_bind(false);
        }
        if let Some((field, desc)) = &filter.order_by {
            if field == "created_at" || field == "updated_at" || field == "id" {
                qb.push(format!(" ORDER BY {} {}", field, if *desc { "DESC" } else { "ASC" }));
            }
        }
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }
        if let Some(offset) = filter.offset {
            qb.push(" OFFSET ").push_bind(offset as i64);
        }

        let rows = qb.build().fetch_all(&mut *session).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let value: serde_json::Value = row.try_get::<String, _>("data").map(|s| {
                serde_json::from_str(&s).unwrap_or(serde_json::Value::Null)
            })?;
            if filter.matches(&value) {
                out.push(decode_row(row)?);
            }
        }
        Ok(out)
    }

    pub async fn count(&self, filter: &Filter) -> Result<u64, RepositoryError> {
        Ok(self.list(filter).await?.len() as u64)
    }

    pub async fn update(&self, entity: &mut T) -> Result<(), RepositoryError> {
        entity.set_updated_at(Utc::now());
        let mut session = self.manager.session().await?;
        let json = serde_json::to_string(entity).map_err(|e| RepositoryError::Constraint(e.to_string()))?;
        let result = sqlx::query(&format!(
            "UPDATE {} SET data = ?, updated_at = ?, deleted = ? WHERE id = ?",
            T::TABLE
        ))
        .bind(json)
        .bind(entity.updated_at())
        .bind(entity.is_deleted())
        .bind(entity.id().to_string())
        .execute(&mut *session)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound {
                entity: T::TABLE,
                id: entity.id().to_string(),
            });
        }
        Ok(())
    }

    /// Soft-deletes by id, leaving the row in place with `deleted = true`.
    pub async fn delete(&self, id: &T::Id) -> Result<(), RepositoryError> {
        let mut entity = self.get_required(id).await?;
        entity.mark_deleted(Utc::now());
        self.update(&mut entity).await
    }

    /// Hard-deletes by id. Retention sweeps and repository-level
    /// `cleanup(retention_days)` operations need a real row removal, not
    /// the soft-delete `deleted` flag `delete` leaves behind.
    pub async fn hard_delete(&self, id: &T::Id) -> Result<(), RepositoryError> {
        sqlx::query(&format!("DELETE FROM {} WHERE id = ?", T::TABLE))
            .bind(id.to_string())
            .execute(&mut *self.manager.session().await?)
            .await?;
        Ok(())
    }

    pub async fn bulk_create(&self, entities: &[T]) -> Result<(), RepositoryError> {
        for entity in entities {
            self.create(entity).await?;
        }
        Ok(())
    }

    pub async fn bulk_update(&self, entities: &mut [T]) -> Result<(), RepositoryError> {
        for entity in entities.iter_mut() {
            self.update(entity).await?;
        }
        Ok(())
    }

    /// Simple substring search over a single text field across all rows.
    /// Intentionally naive (no full-text index) — adequate at fleet scale,
    /// revisit if it ever shows up in a slow-query log.
    pub async fn search(&self, field: &str, needle: &str) -> Result<Vec<T>, RepositoryError> {
        let filter = Filter::new().op(field, FilterOp::ILike(format!("%{needle}%")));
        self.list(&filter).await
    }
}

fn decode_row<T: Entity>(row: &AnyRow) -> Result<T, RepositoryError> {
    let raw: String = row.try_get("data")?;
    serde_json::from_str(&raw).map_err(|e| RepositoryError::Constraint(e.to_string()))
}

/// Issues the `CREATE TABLE IF NOT EXISTS` for an entity's table using the
/// generic JSON-blob layout. Repositories call this once at startup;
/// revision-graph migrations in [`crate::migration`] own schema changes
/// beyond this baseline shape.
pub async fn ensure_table(manager: &ConnectionManager, table: &str) -> Result<(), RepositoryError> {
    manager
        .execute(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                deleted BOOLEAN NOT NULL DEFAULT FALSE
            )"
        ))
        .await
        .map_err(RepositoryError::from)?;
    Ok(())
}
