//! Represents one uploaded item: a user label plus a reference to its blob.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Path prefix under which blobs are served back to clients.
pub const OBJECT_ROUTE_PREFIX: &str = "/uploads";

/// A row of the `images` table.
///
/// Records are immutable once inserted. Ordering for every list query is
/// `created_at DESC, id DESC`.
#[derive(Serialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct Record {
    /// Backend-assigned primary key, never reused.
    pub id: i64,

    /// User-supplied label, never empty.
    pub name: String,

    /// Opaque reference to the payload in the object store.
    #[sqlx(rename = "image_path")]
    pub object_key: String,

    /// Backend-assigned insertion time.
    pub created_at: DateTime<Utc>,
}

/// Rows of one page together with the total row count, both read from the
/// same endpoint.
#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    pub rows: Vec<Record>,
    pub total: i64,
}

/// Client-facing shape of a record. Storage details are replaced by a stable
/// retrieval URL.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecordView {
    pub id: i64,
    pub name: String,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Record> for RecordView {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            image_url: object_url(&record.object_key),
            created_at: record.created_at,
        }
    }
}

/// Retrieval path for an object key.
pub fn object_url(object_key: &str) -> String {
    format!("{}/{}", OBJECT_ROUTE_PREFIX, object_key.trim_start_matches('/'))
}
