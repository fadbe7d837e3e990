//! RecordService: insert, list, latest and delete-with-blob-cleanup.
//!
//! The service owns the ordering contract between the relational backend and
//! the object store:
//! - insert: blob first, then row. A failed row insert triggers a
//!   best-effort removal of the fresh blob.
//! - delete: strongly consistent lookup on the write target, blob removal
//!   (missing blob tolerated), then row deletion. A crash in between leaves a
//!   row with a broken image, never an unreferenced blob.

use crate::models::{ConnectionTarget, Record, Sourced};
use crate::services::backend::{BackendError, RecordBackend};
use crate::services::object_store::{
    ObjectErrorKind, ObjectStore, ObjectStoreError, StoredObject, ensure_key_safe,
};
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 50;
pub const RECENT_LIMIT: u32 = 5;

/// Attempts at finding a free key before giving up. Every attempt after the
/// first carries a random suffix, so more than two is already unusual.
const KEY_ATTEMPTS: u32 = 5;
const MAX_SANITIZED_NAME_LEN: usize = 200;
const FALLBACK_FILENAME: &str = "upload";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("backend unavailable: {0}")]
    BackendUnavailable(#[from] BackendError),
    #[error("object store failure: {0}")]
    ObjectStore(#[from] ObjectStoreError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// An upload as received from the ingress.
#[derive(Debug, Default, Clone)]
pub struct NewUpload {
    pub name: String,
    pub payload: Option<Bytes>,
    pub content_type: Option<String>,
    pub original_filename: Option<String>,
}

/// One page of records plus pagination metadata.
#[derive(Debug, Clone)]
pub struct PageResult {
    pub items: Vec<Record>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
}

impl PageResult {
    /// `ceil(total / limit)`.
    pub fn total_pages(&self) -> i64 {
        let limit = i64::from(self.limit.max(1));
        (self.total.max(0) + limit - 1) / limit
    }
}

/// Result of a delete: the row lookup and the deletion each report the
/// endpoint that served them.
#[derive(Debug, Clone)]
pub struct Deletion {
    pub value: bool,
    pub lookup: ConnectionTarget,
    pub source: ConnectionTarget,
}

impl Deletion {
    /// Descriptor of the endpoint that ran the `DELETE`.
    pub fn descriptor(&self) -> String {
        self.source.to_string()
    }
}

#[derive(Clone)]
pub struct RecordService {
    backend: Arc<dyn RecordBackend>,
    objects: Arc<dyn ObjectStore>,
}

impl RecordService {
    pub fn new(backend: Arc<dyn RecordBackend>, objects: Arc<dyn ObjectStore>) -> Self {
        Self { backend, objects }
    }

    pub fn backend(&self) -> &Arc<dyn RecordBackend> {
        &self.backend
    }

    pub fn objects(&self) -> &Arc<dyn ObjectStore> {
        &self.objects
    }

    /// Validate, store the payload, then insert the row.
    pub async fn insert(&self, upload: NewUpload) -> ServiceResult<Sourced<Record>> {
        let name = upload.name.trim();
        if name.is_empty() {
            return Err(ServiceError::Validation("name is required".into()));
        }
        let payload = match upload.payload {
            Some(payload) if !payload.is_empty() => payload,
            _ => return Err(ServiceError::Validation("image file is required".into())),
        };
        let content_type = upload
            .content_type
            .as_deref()
            .unwrap_or("application/octet-stream");
        let original = upload
            .original_filename
            .as_deref()
            .unwrap_or(FALLBACK_FILENAME);

        let key = self.store_payload(original, payload, content_type).await?;

        match self.backend.insert(name, &key).await {
            Ok(record) => {
                debug!(id = record.value.id, key = %key, "record inserted");
                Ok(record)
            }
            Err(err) => {
                if let Err(cleanup) = self.objects.remove(&key).await {
                    warn!(key = %key, error = %cleanup, "could not remove blob after failed insert");
                }
                Err(err.into())
            }
        }
    }

    /// Put the payload under a fresh key. A taken key is retried with a
    /// random suffix after the timestamp.
    async fn store_payload(
        &self,
        original: &str,
        payload: Bytes,
        content_type: &str,
    ) -> ServiceResult<String> {
        let mut key = object_key(Utc::now().timestamp_millis(), original);
        let mut attempt = 1;
        loop {
            match self.objects.put(&key, payload.clone(), content_type).await {
                Ok(()) => return Ok(key),
                Err(err)
                    if err.kind() == ObjectErrorKind::AlreadyExists && attempt < KEY_ATTEMPTS =>
                {
                    debug!(key = %key, attempt, "object key taken, retrying");
                    key = disambiguated_key(Utc::now().timestamp_millis(), original);
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub async fn latest(&self) -> ServiceResult<Sourced<Option<Record>>> {
        Ok(self.backend.latest().await?)
    }

    /// `page` is clamped to at least 1 and `limit` to `[1, 50]`.
    pub async fn page(&self, page: u32, limit: u32) -> ServiceResult<Sourced<PageResult>> {
        let page = page.max(1);
        let limit = limit.clamp(1, MAX_PAGE_LIMIT);
        let offset = i64::from(page - 1) * i64::from(limit);

        let result = self.backend.page(offset, i64::from(limit)).await?;
        Ok(result.map(|rows| PageResult {
            items: rows.rows,
            total: rows.total,
            page,
            limit,
        }))
    }

    /// The `n` most recent records.
    pub async fn recent(&self, n: u32) -> ServiceResult<Sourced<Vec<Record>>> {
        let limit = i64::from(n.clamp(1, MAX_PAGE_LIMIT));
        let result = self.backend.page(0, limit).await?;
        Ok(result.map(|page| page.rows))
    }

    /// Delete a record and its blob. `value` is `false` when the id does not
    /// exist.
    pub async fn delete(&self, id: i64) -> ServiceResult<Deletion> {
        let lookup = self.backend.find_for_delete(id).await?;
        let Some(record) = lookup.value else {
            debug!(id, "delete of unknown record");
            return Ok(Deletion {
                value: false,
                source: lookup.source.clone(),
                lookup: lookup.source,
            });
        };

        self.objects.remove(&record.object_key).await?;
        let deleted = self.backend.delete_by_id(id).await?;
        debug!(id, key = %record.object_key, "record deleted");
        Ok(Deletion {
            value: deleted.value,
            lookup: lookup.source,
            source: deleted.source,
        })
    }

    /// Open a blob for the retrieval path.
    pub async fn open_object(&self, key: &str) -> ServiceResult<StoredObject> {
        ensure_key_safe(key).map_err(|_| ServiceError::NotFound(format!("object `{key}`")))?;
        self.objects.get(key).await.map_err(|err| match err.kind() {
            ObjectErrorKind::NotFound => ServiceError::NotFound(format!("object `{key}`")),
            _ => ServiceError::ObjectStore(err),
        })
    }
}

/// Object key for an upload: `<millis>-<sanitized original name>`.
pub fn object_key(millis: i64, original_filename: &str) -> String {
    format!("{}-{}", millis, sanitize_filename(original_filename))
}

/// Collision fallback: `<millis>-<8 hex chars>-<sanitized original name>`.
pub fn disambiguated_key(millis: i64, original_filename: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        millis,
        &suffix[..8],
        sanitize_filename(original_filename)
    )
}

/// Keep only `[A-Za-z0-9_.-]`, bounded in length.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .take(MAX_SANITIZED_NAME_LEN)
        .collect();
    if cleaned.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        cleaned
    }
}
