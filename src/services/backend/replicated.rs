//! Primary/replica backend.
//!
//! Writes and delete lookups go to the primary pool only. Pure reads go
//! through the [`FailoverRouter`]. The schema is created on the primary once;
//! the replica is expected to converge through external replication.

use super::{BackendResult, FailoverRouter, RecordBackend, RecordTarget};
use crate::models::{ConnectionTarget, Record, RecordPage, Role, Sourced};
use async_trait::async_trait;
use std::sync::Arc;

pub struct ReplicatedBackend {
    router: FailoverRouter,
}

impl ReplicatedBackend {
    pub fn new(primary: Arc<dyn RecordTarget>, replica: Arc<dyn RecordTarget>) -> Self {
        Self {
            router: FailoverRouter::new(primary, replica),
        }
    }

    pub fn router(&self) -> &FailoverRouter {
        &self.router
    }

    fn primary(&self) -> &dyn RecordTarget {
        self.router.primary().as_ref()
    }
}

#[async_trait]
impl RecordBackend for ReplicatedBackend {
    fn kind(&self) -> &'static str {
        "mysql"
    }

    fn write_target(&self) -> ConnectionTarget {
        ConnectionTarget::new(Role::Write, self.primary().endpoint().clone())
    }

    async fn init_schema(&self) -> BackendResult<()> {
        self.primary().create_table().await
    }

    async fn insert(&self, name: &str, object_key: &str) -> BackendResult<Sourced<Record>> {
        self.primary().insert(name, object_key).await
    }

    async fn latest(&self) -> BackendResult<Sourced<Option<Record>>> {
        self.router.latest().await
    }

    async fn page(&self, offset: i64, limit: i64) -> BackendResult<Sourced<RecordPage>> {
        self.router.page(offset, limit).await
    }

    async fn find_for_delete(&self, id: i64) -> BackendResult<Sourced<Option<Record>>> {
        self.primary().find(id, Role::Write).await
    }

    async fn delete_by_id(&self, id: i64) -> BackendResult<Sourced<bool>> {
        self.primary().delete(id).await
    }

    async fn ping_write(&self) -> BackendResult<()> {
        self.primary().ping().await
    }

    async fn ping_read(&self) -> BackendResult<()> {
        self.router.replica().ping().await
    }
}
