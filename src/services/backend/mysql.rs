//! MySQL endpoint, used for both sides of a primary/replica pair.
//!
//! Pools connect lazily so a replica that is down at startup only degrades
//! reads instead of preventing the process from starting. Each operation
//! acquires a connection, records the server session id from that same
//! connection, and releases it when done.

use super::{BackendError, BackendResult, RECORD_COLUMNS, RecordTarget};
use crate::config::{HostPort, MySqlConfig};
use crate::models::{ConnectionTarget, Endpoint, Record, RecordPage, Role, Sourced};
use async_trait::async_trait;
use sqlx::{
    MySqlConnection, MySqlPool,
    mysql::{MySqlConnectOptions, MySqlPoolOptions},
};
use std::time::Duration;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS images (
    id BIGINT AUTO_INCREMENT PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    image_path VARCHAR(1024) NOT NULL,
    created_at TIMESTAMP(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3),
    INDEX idx_images_created (created_at, id)
) ENGINE=InnoDB";

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct MySqlTarget {
    pool: MySqlPool,
    endpoint: Endpoint,
}

impl MySqlTarget {
    /// Build a lazily-connecting pool of at most `pool_size` connections.
    pub fn connect(cfg: &MySqlConfig, addr: &HostPort, pool_size: u32) -> Self {
        let opts = MySqlConnectOptions::new()
            .host(&addr.host)
            .port(addr.port)
            .username(&cfg.user)
            .password(&cfg.password)
            .database(&cfg.database);

        let pool = MySqlPoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_lazy_with(opts);

        Self {
            pool,
            endpoint: Endpoint::new(addr.host.clone(), Some(addr.port)),
        }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    fn failed(&self, source: sqlx::Error) -> BackendError {
        BackendError::Query {
            endpoint: self.endpoint.to_string(),
            source,
        }
    }

    async fn session_id(&self, conn: &mut MySqlConnection) -> BackendResult<u64> {
        sqlx::query_scalar::<_, u64>("SELECT CONNECTION_ID()")
            .fetch_one(conn)
            .await
            .map_err(|err| self.failed(err))
    }

    async fn fetch_by_id(
        &self,
        conn: &mut MySqlConnection,
        id: i64,
    ) -> BackendResult<Option<Record>> {
        sqlx::query_as::<_, Record>(&format!(
            "SELECT {RECORD_COLUMNS} FROM images WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(|err| self.failed(err))
    }

    fn tag<T>(&self, value: T, role: Role, session: u64) -> Sourced<T> {
        Sourced::new(
            value,
            ConnectionTarget::new(role, self.endpoint.clone()).with_session(session),
        )
    }
}

#[async_trait]
impl RecordTarget for MySqlTarget {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn create_table(&self) -> BackendResult<()> {
        tracing::debug!("Executing schema SQL: {}", CREATE_TABLE);
        sqlx::query(CREATE_TABLE)
            .execute(&self.pool)
            .await
            .map_err(|err| self.failed(err))?;
        Ok(())
    }

    async fn insert(&self, name: &str, object_key: &str) -> BackendResult<Sourced<Record>> {
        let mut conn = self.pool.acquire().await.map_err(|err| self.failed(err))?;
        let session = self.session_id(&mut conn).await?;

        let result = sqlx::query("INSERT INTO images (name, image_path) VALUES (?, ?)")
            .bind(name)
            .bind(object_key)
            .execute(&mut *conn)
            .await
            .map_err(|err| self.failed(err))?;

        // No RETURNING in MySQL; read the row back on the same connection.
        let id = result.last_insert_id() as i64;
        let record = self
            .fetch_by_id(&mut conn, id)
            .await?
            .ok_or_else(|| self.failed(sqlx::Error::RowNotFound))?;

        Ok(self.tag(record, Role::Write, session))
    }

    async fn find(&self, id: i64, role: Role) -> BackendResult<Sourced<Option<Record>>> {
        let mut conn = self.pool.acquire().await.map_err(|err| self.failed(err))?;
        let session = self.session_id(&mut conn).await?;
        let record = self.fetch_by_id(&mut conn, id).await?;
        Ok(self.tag(record, role, session))
    }

    async fn latest(&self, role: Role) -> BackendResult<Sourced<Option<Record>>> {
        let mut conn = self.pool.acquire().await.map_err(|err| self.failed(err))?;
        let session = self.session_id(&mut conn).await?;

        let record = sqlx::query_as::<_, Record>(&format!(
            "SELECT {RECORD_COLUMNS} FROM images ORDER BY created_at DESC, id DESC LIMIT 1"
        ))
        .fetch_optional(&mut *conn)
        .await
        .map_err(|err| self.failed(err))?;

        Ok(self.tag(record, role, session))
    }

    async fn page(
        &self,
        offset: i64,
        limit: i64,
        role: Role,
    ) -> BackendResult<Sourced<RecordPage>> {
        // InnoDB gives the transaction one snapshot for both statements.
        let mut tx = self.pool.begin().await.map_err(|err| self.failed(err))?;
        let session = self.session_id(&mut tx).await?;

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
        Ok(self.tag(RecordPage { rows, total }, role, session))
    }

    async fn delete(&self, id: i64) -> BackendResult<Sourced<bool>> {
        let mut conn = self.pool.acquire().await.map_err(|err| self.failed(err))?;
        let session = self.session_id(&mut conn).await?;

        let result = sqlx::query("DELETE FROM images WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(|err| self.failed(err))?;

        Ok(self.tag(result.rows_affected() > 0, Role::Write, session))
    }

    async fn ping(&self) -> BackendResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|err| self.failed(err))?;
        Ok(())
    }
}
