//! Blob storage for uploaded payloads.
//!
//! Callers match on [`ObjectErrorKind`] rather than on driver-specific
//! error shapes. In particular `remove` treats a missing key as success.

use crate::config::ObjectStoreConfig;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::{fmt, io, sync::Arc};
use thiserror::Error;

pub mod http;
pub mod local;

pub use http::HttpObjectStore;
pub use local::LocalObjectStore;

const MAX_OBJECT_KEY_LEN: usize = 1024;

pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// An object opened for reading.
pub struct StoredObject {
    pub content_type: String,
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl fmt::Debug for StoredObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredObject")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectErrorKind {
    NotFound,
    AlreadyExists,
    PermissionDenied,
    InvalidKey,
    Unavailable,
}

impl fmt::Display for ObjectErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ObjectErrorKind::NotFound => "not found",
            ObjectErrorKind::AlreadyExists => "already exists",
            ObjectErrorKind::PermissionDenied => "permission denied",
            ObjectErrorKind::InvalidKey => "invalid key",
            ObjectErrorKind::Unavailable => "unavailable",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Error)]
#[error("object `{key}` {kind}: {message}")]
pub struct ObjectStoreError {
    kind: ObjectErrorKind,
    key: String,
    message: String,
}

impl ObjectStoreError {
    pub fn new(kind: ObjectErrorKind, key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::new(ObjectErrorKind::NotFound, key, "no such object")
    }

    pub fn invalid_key(key: impl Into<String>) -> Self {
        Self::new(ObjectErrorKind::InvalidKey, key, "rejected by key validation")
    }

    /// Classify a filesystem error.
    pub fn from_io(key: impl Into<String>, err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::NotFound => ObjectErrorKind::NotFound,
            io::ErrorKind::AlreadyExists => ObjectErrorKind::AlreadyExists,
            io::ErrorKind::PermissionDenied => ObjectErrorKind::PermissionDenied,
            _ => ObjectErrorKind::Unavailable,
        };
        Self::new(kind, key, err.to_string())
    }

    pub fn kind(&self) -> ObjectErrorKind {
        self.kind
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

pub type ObjectResult<T> = Result<T, ObjectStoreError>;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Human-readable location for logs and readiness output.
    fn describe(&self) -> String;

    /// Store `bytes` under `key`.
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> ObjectResult<()>;

    /// Open `key` for streaming. Missing keys fail with `NotFound`.
    async fn get(&self, key: &str) -> ObjectResult<StoredObject>;

    /// Delete `key`. Deleting a missing key succeeds.
    async fn remove(&self, key: &str) -> ObjectResult<()>;

    /// Cheap end-to-end check that the store accepts I/O.
    async fn probe(&self) -> ObjectResult<()>;
}

/// Reject keys that could escape the store's namespace.
///
/// Keys are a single path component: non-empty, at most 1024 bytes, not
/// `.` or `..`, and free of `/`, `\`, NUL and control characters.
pub fn ensure_key_safe(key: &str) -> ObjectResult<()> {
    if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
        return Err(ObjectStoreError::invalid_key(key));
    }
    if key == "." || key == ".." {
        return Err(ObjectStoreError::invalid_key(key));
    }
    if key
        .bytes()
        .any(|b| b.is_ascii_control() || b == b'/' || b == b'\\')
    {
        return Err(ObjectStoreError::invalid_key(key));
    }
    Ok(())
}

/// Open the object store selected by configuration.
pub async fn open(cfg: &ObjectStoreConfig) -> ObjectResult<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match cfg {
        ObjectStoreConfig::Local { root } => Arc::new(LocalObjectStore::open(root).await?),
        ObjectStoreConfig::Http { endpoint, bucket } => {
            Arc::new(HttpObjectStore::new(endpoint.clone(), bucket.clone())?)
        }
    };
    tracing::info!(store = %store.describe(), "object store ready");
    Ok(store)
}
