//! Read routing with a single replica-to-primary fallback hop.
//!
//! Every call starts at the replica. Any replica failure (refused
//! connection, acquire timeout, query error) is logged and the identical read
//! is re-run on the primary, whose answer is authoritative. There is no
//! retry, backoff or sticky state between calls: each read re-evaluates the
//! replica from scratch.

use super::{BackendError, BackendResult, ReadOp, RecordTarget};
use crate::models::{Record, RecordPage, Role, Sourced};
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::{error, warn};

#[derive(Clone)]
pub struct FailoverRouter {
    primary: Arc<dyn RecordTarget>,
    replica: Arc<dyn RecordTarget>,
}

impl FailoverRouter {
    pub fn new(primary: Arc<dyn RecordTarget>, replica: Arc<dyn RecordTarget>) -> Self {
        Self { primary, replica }
    }

    pub fn primary(&self) -> &Arc<dyn RecordTarget> {
        &self.primary
    }

    pub fn replica(&self) -> &Arc<dyn RecordTarget> {
        &self.replica
    }

    pub async fn latest(&self) -> BackendResult<Sourced<Option<Record>>> {
        self.read(ReadOp::Latest, |target| target.latest(Role::Read))
            .await
    }

    pub async fn page(&self, offset: i64, limit: i64) -> BackendResult<Sourced<RecordPage>> {
        self.read(ReadOp::Page { offset, limit }, move |target| {
            target.page(offset, limit, Role::Read)
        })
        .await
    }

    /// Run `op` on the replica, then on the primary if the replica failed.
    ///
    /// The returned descriptor names whichever endpoint produced the value.
    pub async fn read<T, F>(&self, op: ReadOp, run: F) -> BackendResult<Sourced<T>>
    where
        T: Send,
        F: for<'a> Fn(&'a dyn RecordTarget) -> BoxFuture<'a, BackendResult<Sourced<T>>>
            + Send
            + Sync,
    {
        let replica_error = match run(self.replica.as_ref()).await {
            Ok(result) => return Ok(result),
            Err(err) => err,
        };

        warn!(
            op = %op,
            replica = %self.replica.endpoint(),
            primary = %self.primary.endpoint(),
            error = %replica_error,
            "replica read failed, falling back to primary"
        );

        run(self.primary.as_ref()).await.map_err(|primary_error| {
            error!(
                op = %op,
                primary = %self.primary.endpoint(),
                error = %primary_error,
                "primary read failed after replica fallback"
            );
            BackendError::ReadFailed {
                op,
                replica_error: replica_error.to_string(),
                primary: Box::new(primary_error),
            }
        })
    }
}
