//! SQLite endpoint: a single local database file.

use super::{BackendError, BackendResult, RECORD_COLUMNS, RecordTarget};
use crate::models::{ConnectionTarget, Endpoint, Record, RecordPage, Role, Sourced};
use async_trait::async_trait;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use std::{path::Path, time::Duration};
use tokio::fs;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

// Millisecond ISO-8601 timestamps sort lexicographically in time order.
const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    image_path TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
)";

const CREATE_ORDER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_images_created ON images (created_at DESC, id DESC)";

pub struct SqliteTarget {
    pool: SqlitePool,
    endpoint: Endpoint,
}

impl SqliteTarget {
    /// Open (creating if needed) the database file at `path`.
    pub async fn open(path: impl AsRef<Path>, max_connections: u32) -> BackendResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }

        let endpoint = Endpoint::new(format!("sqlite:{}", path.display()), None);
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await
            .map_err(|source| BackendError::Query {
                endpoint: endpoint.to_string(),
                source,
            })?;

        Ok(Self { pool, endpoint })
    }

    /// Report this target under a different endpoint name.
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn failed(&self, source: sqlx::Error) -> BackendError {
        BackendError::Query {
            endpoint: self.endpoint.to_string(),
            source,
        }
    }

    fn tag<T>(&self, value: T, role: Role) -> Sourced<T> {
        Sourced::new(value, ConnectionTarget::new(role, self.endpoint.clone()))
    }
}

#[async_trait]
impl RecordTarget for SqliteTarget {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn create_table(&self) -> BackendResult<()> {
        for stmt in [CREATE_TABLE, CREATE_ORDER_INDEX] {
            tracing::debug!("Executing schema SQL: {}", stmt);
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|err| self.failed(err))?;
        }
        Ok(())
    }

    async fn insert(&self, name: &str, object_key: &str) -> BackendResult<Sourced<Record>> {
        let record = sqlx::query_as::<_, Record>(&format!(
            "INSERT INTO images (name, image_path) VALUES (?, ?) RETURNING {RECORD_COLUMNS}"
        ))
        .bind(name)
        .bind(object_key)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| self.failed(err))?;

        Ok(self.tag(record, Role::Write))
    }

    async fn find(&self, id: i64, role: Role) -> BackendResult<Sourced<Option<Record>>> {
        let record = sqlx::query_as::<_, Record>(&format!(
            "SELECT {RECORD_COLUMNS} FROM images WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| self.failed(err))?;

        Ok(self.tag(record, role))
    }

    async fn latest(&self, role: Role) -> BackendResult<Sourced<Option<Record>>> {
        let record = sqlx::query_as::<_, Record>(&format!(
            "SELECT {RECORD_COLUMNS} FROM images ORDER BY created_at DESC, id DESC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| self.failed(err))?;

        Ok(self.tag(record, role))
    }

    async fn page(
        &self,
        offset: i64,
        limit: i64,
        role: Role,
    ) -> BackendResult<Sourced<RecordPage>> {
        // One transaction so the count matches the rows it paginates.
        let mut tx = self.pool.begin().await.map_err(|err| self.failed(err))?;

        let rows = sqlx::query_as::<_, Record>(&format!(
            "SELECT {RECORD_COLUMNS} FROM images
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *tx)
        .await
        .map_err(|err| self.failed(err))?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM images")
            .fetch_one(&mut *tx)
            .await
            .map_err(|err| self.failed(err))?;

        tx.commit().await.map_err(|err| self.failed(err))?;
        Ok(self.tag(RecordPage { rows, total }, role))
    }

    async fn delete(&self, id: i64) -> BackendResult<Sourced<bool>> {
        let result = sqlx::query("DELETE FROM images WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|err| self.failed(err))?;

        Ok(self.tag(result.rows_affected() > 0, Role::Write))
    }

    async fn ping(&self) -> BackendResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|err| self.failed(err))?;
        Ok(())
    }
}
