//! Relational record backends.
//!
//! Two layers:
//! - [`RecordTarget`] is one physical endpoint (an SQLite file or a MySQL
//!   server) that can run every statement against the `images` table.
//! - [`RecordBackend`] is what the lifecycle service talks to. The embedded
//!   variant uses a single target for everything; the replicated variant
//!   sends writes to the primary and reads through the [`FailoverRouter`].
//!
//! Every result comes back as [`Sourced`] so callers know which endpoint
//! served it.

use crate::config::DatabaseConfig;
use crate::models::{ConnectionTarget, Endpoint, Record, RecordPage, Role, Sourced};
use async_trait::async_trait;
use std::{fmt, io, sync::Arc};
use thiserror::Error;

pub mod embedded;
pub mod mysql;
pub mod replicated;
pub mod router;
pub mod sqlite;

pub use embedded::EmbeddedBackend;
pub use mysql::MySqlTarget;
pub use replicated::ReplicatedBackend;
pub use router::FailoverRouter;
pub use sqlite::SqliteTarget;

/// Column list shared by every `SELECT` on `images`.
pub(crate) const RECORD_COLUMNS: &str = "id, name, image_path, created_at";

/// Read operations that go through the failover router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOp {
    Latest,
    Page { offset: i64, limit: i64 },
}

impl fmt::Display for ReadOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadOp::Latest => f.write_str("latest"),
            ReadOp::Page { offset, limit } => write!(f, "page(offset={offset}, limit={limit})"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("query on `{endpoint}` failed: {source}")]
    Query {
        endpoint: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("read `{op}` failed on replica ({replica_error}) and on primary: {primary}")]
    ReadFailed {
        op: ReadOp,
        replica_error: String,
        #[source]
        primary: Box<BackendError>,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// One physical relational endpoint holding the `images` table.
///
/// `role` tags the returned descriptor; it does not change which pool is
/// used, since a target owns exactly one pool.
#[async_trait]
pub trait RecordTarget: Send + Sync {
    fn endpoint(&self) -> &Endpoint;

    /// Create the `images` table if it is absent.
    async fn create_table(&self) -> BackendResult<()>;

    /// Insert a row and return it as stored, with backend-assigned fields.
    async fn insert(&self, name: &str, object_key: &str) -> BackendResult<Sourced<Record>>;

    async fn find(&self, id: i64, role: Role) -> BackendResult<Sourced<Option<Record>>>;

    async fn latest(&self, role: Role) -> BackendResult<Sourced<Option<Record>>>;

    /// Rows and total count, both read on the same connection.
    async fn page(&self, offset: i64, limit: i64, role: Role)
    -> BackendResult<Sourced<RecordPage>>;

    /// Returns `false` when no row had that id.
    async fn delete(&self, id: i64) -> BackendResult<Sourced<bool>>;

    async fn ping(&self) -> BackendResult<()>;
}

/// Storage interface seen by the lifecycle service.
#[async_trait]
pub trait RecordBackend: Send + Sync {
    /// Short name for logs and readiness output.
    fn kind(&self) -> &'static str;

    /// The endpoint every write goes to.
    fn write_target(&self) -> ConnectionTarget;

    /// Create the schema on the write target.
    async fn init_schema(&self) -> BackendResult<()>;

    async fn insert(&self, name: &str, object_key: &str) -> BackendResult<Sourced<Record>>;

    async fn latest(&self) -> BackendResult<Sourced<Option<Record>>>;

    async fn page(&self, offset: i64, limit: i64) -> BackendResult<Sourced<RecordPage>>;

    /// Strongly consistent lookup on the write target, used before deletes.
    async fn find_for_delete(&self, id: i64) -> BackendResult<Sourced<Option<Record>>>;

    async fn delete_by_id(&self, id: i64) -> BackendResult<Sourced<bool>>;

    async fn ping_write(&self) -> BackendResult<()>;

    async fn ping_read(&self) -> BackendResult<()>;
}

/// Open the backend variant selected by configuration and create its schema.
pub async fn open(cfg: &DatabaseConfig) -> BackendResult<Arc<dyn RecordBackend>> {
    let backend: Arc<dyn RecordBackend> = match cfg {
        DatabaseConfig::Sqlite { path } => {
            let target = SqliteTarget::open(path, sqlite::DEFAULT_MAX_CONNECTIONS).await?;
            Arc::new(EmbeddedBackend::new(target))
        }
        DatabaseConfig::MySql(mysql_cfg) => {
            let primary =
                MySqlTarget::connect(mysql_cfg, &mysql_cfg.primary, mysql_cfg.write_pool_size);
            let replica =
                MySqlTarget::connect(mysql_cfg, &mysql_cfg.replica, mysql_cfg.read_pool_size);
            Arc::new(ReplicatedBackend::new(Arc::new(primary), Arc::new(replica)))
        }
    };
    backend.init_schema().await?;
    tracing::info!(backend = backend.kind(), "record schema ready");
    Ok(backend)
}
