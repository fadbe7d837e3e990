//! Single-file backend: one SQLite target serves reads and writes.

use super::{BackendResult, RecordBackend, RecordTarget, SqliteTarget};
use crate::models::{ConnectionTarget, Record, RecordPage, Role, Sourced};
use async_trait::async_trait;

pub struct EmbeddedBackend {
    target: SqliteTarget,
}

impl EmbeddedBackend {
    pub fn new(target: SqliteTarget) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &SqliteTarget {
        &self.target
    }
}

#[async_trait]
impl RecordBackend for EmbeddedBackend {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    fn write_target(&self) -> ConnectionTarget {
        ConnectionTarget::new(Role::Write, self.target.endpoint().clone())
    }

    async fn init_schema(&self) -> BackendResult<()> {
        self.target.create_table().await
    }

    async fn insert(&self, name: &str, object_key: &str) -> BackendResult<Sourced<Record>> {
        self.target.insert(name, object_key).await
    }

    async fn latest(&self) -> BackendResult<Sourced<Option<Record>>> {
        self.target.latest(Role::Read).await
    }

    async fn page(&self, offset: i64, limit: i64) -> BackendResult<Sourced<RecordPage>> {
        self.target.page(offset, limit, Role::Read).await
    }

    async fn find_for_delete(&self, id: i64) -> BackendResult<Sourced<Option<Record>>> {
        self.target.find(id, Role::Write).await
    }

    async fn delete_by_id(&self, id: i64) -> BackendResult<Sourced<bool>> {
        self.target.delete(id).await
    }

    async fn ping_write(&self) -> BackendResult<()> {
        self.target.ping().await
    }

    async fn ping_read(&self) -> BackendResult<()> {
        self.target.ping().await
    }
}
