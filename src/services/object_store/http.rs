//! Client for an S3-style HTTP object service.
//!
//! Objects are addressed as `{endpoint}/{bucket}/{key}` and manipulated with
//! plain `PUT`, `GET` and `DELETE`. Every `PUT` is conditional
//! (`If-None-Match: *`); a remote that already holds the key answers 412,
//! reported as `AlreadyExists`, so two servers sharing a bucket never alias
//! one blob to two records.

use super::{
    ObjectErrorKind, ObjectResult, ObjectStore, ObjectStoreError, StoredObject, ensure_key_safe,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, StatusCode, header};
use std::{io, time::Duration};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: Client,
    endpoint: String,
    bucket: String,
}

impl HttpObjectStore {
    pub fn new(endpoint: impl Into<String>, bucket: impl Into<String>) -> ObjectResult<Self> {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| {
                ObjectStoreError::new(ObjectErrorKind::Unavailable, &endpoint, err.to_string())
            })?;
        Ok(Self {
            client,
            endpoint,
            bucket: bucket.into(),
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key)
    }
}

/// Map a non-success status to an error kind.
fn status_error(key: &str, status: StatusCode) -> ObjectStoreError {
    let kind = match status {
        StatusCode::NOT_FOUND => ObjectErrorKind::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ObjectErrorKind::PermissionDenied,
        StatusCode::BAD_REQUEST => ObjectErrorKind::InvalidKey,
        StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT => ObjectErrorKind::AlreadyExists,
        _ => ObjectErrorKind::Unavailable,
    };
    ObjectStoreError::new(kind, key, format!("remote answered {status}"))
}

fn transport_error(key: &str, err: reqwest::Error) -> ObjectStoreError {
    ObjectStoreError::new(ObjectErrorKind::Unavailable, key, err.to_string())
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    fn describe(&self) -> String {
        format!("http:{}/{}", self.endpoint, self.bucket)
    }

    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> ObjectResult<()> {
        ensure_key_safe(key)?;
        let response = self
            .client
            .put(self.object_url(key))
            .header(header::CONTENT_TYPE, content_type)
            .header(header::IF_NONE_MATCH, "*")
            .body(bytes)
            .send()
            .await
            .map_err(|err| transport_error(key, err))?;

        if !response.status().is_success() {
            return Err(status_error(key, response.status()));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> ObjectResult<StoredObject> {
        ensure_key_safe(key)?;
        let response = self
            .client
            .get(self.object_url(key))
            .send()
            .await
            .map_err(|err| transport_error(key, err))?;

        if !response.status().is_success() {
            return Err(status_error(key, response.status()));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let content_length = response.content_length();
        let body = response.bytes_stream().map_err(io::Error::other).boxed();

        Ok(StoredObject {
            content_type,
            content_length,
            body,
        })
    }

    async fn remove(&self, key: &str) -> ObjectResult<()> {
        ensure_key_safe(key)?;
        let response = self
            .client
            .delete(self.object_url(key))
            .send()
            .await
            .map_err(|err| transport_error(key, err))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                tracing::debug!("object {} already missing on remote", key);
                Ok(())
            }
            status => Err(status_error(key, status)),
        }
    }

    async fn probe(&self) -> ObjectResult<()> {
        let url = format!("{}/healthz", self.endpoint);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| transport_error(&url, err))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error(&url, response.status()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        extract::{Path, State},
        http::HeaderMap,
        response::{IntoResponse, Response},
        routing::get,
    };
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };
    use tokio::net::TcpListener;

    /// In-memory bucket server. The `locked` bucket refuses everything.
    #[derive(Clone, Default)]
    struct FakeRemote {
        objects: Arc<Mutex<HashMap<String, (String, Bytes)>>>,
    }

    async fn fake_put(
        State(remote): State<FakeRemote>,
        Path((bucket, key)): Path<(String, String)>,
        headers: HeaderMap,
        body: Bytes,
    ) -> StatusCode {
        if bucket == "locked" {
            return StatusCode::FORBIDDEN;
        }
        let mut objects = remote.objects.lock().unwrap();
        let conditional = headers
            .get(header::IF_NONE_MATCH)
            .is_some_and(|v| v == "*");
        if conditional && objects.contains_key(&key) {
            return StatusCode::PRECONDITION_FAILED;
        }
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        objects.insert(key, (content_type, body));
        StatusCode::OK
    }

    async fn fake_get(
        State(remote): State<FakeRemote>,
        Path((bucket, key)): Path<(String, String)>,
    ) -> Response {
        if bucket == "locked" {
            return StatusCode::FORBIDDEN.into_response();
        }
        match remote.objects.lock().unwrap().get(&key) {
            Some((content_type, body)) => {
                ([(header::CONTENT_TYPE, content_type.clone())], body.clone()).into_response()
            }
            None => StatusCode::NOT_FOUND.into_response(),
        }
    }

    async fn fake_delete(
        State(remote): State<FakeRemote>,
        Path((bucket, key)): Path<(String, String)>,
    ) -> StatusCode {
        if bucket == "locked" {
            return StatusCode::FORBIDDEN;
        }
        match remote.objects.lock().unwrap().remove(&key) {
            Some(_) => StatusCode::NO_CONTENT,
            None => StatusCode::NOT_FOUND,
        }
    }

    /// Serve a fresh fake remote on an ephemeral port; returns its base URL.
    async fn spawn_remote() -> String {
        let app = Router::new()
            .route("/healthz", get(|| async { "ok" }))
            .route(
                "/{bucket}/{key}",
                get(fake_get).put(fake_put).delete(fake_delete),
            )
            .with_state(FakeRemote::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn read_all(object: StoredObject) -> Vec<u8> {
        let mut body = object.body;
        let mut out = Vec::new();
        while let Some(chunk) = body.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[test]
    fn builds_object_urls_without_double_slashes() {
        let store = HttpObjectStore::new("http://objects:3000/", "uploads").unwrap();
        assert_eq!(
            store.object_url("1-a.png"),
            "http://objects:3000/uploads/1-a.png"
        );
        assert_eq!(store.describe(), "http:http://objects:3000/uploads");
    }

    #[test]
    fn status_codes_map_to_kinds() {
        assert_eq!(
            status_error("k", StatusCode::NOT_FOUND).kind(),
            ObjectErrorKind::NotFound
        );
        assert_eq!(
            status_error("k", StatusCode::FORBIDDEN).kind(),
            ObjectErrorKind::PermissionDenied
        );
        assert_eq!(
            status_error("k", StatusCode::PRECONDITION_FAILED).kind(),
            ObjectErrorKind::AlreadyExists
        );
        assert_eq!(
            status_error("k", StatusCode::BAD_GATEWAY).kind(),
            ObjectErrorKind::Unavailable
        );
    }

    #[tokio::test]
    async fn put_get_remove_against_remote() {
        let store = HttpObjectStore::new(spawn_remote().await, "uploads").unwrap();
        store.probe().await.unwrap();

        store
            .put("1-cat.png", Bytes::from_static(b"meow"), "image/png")
            .await
            .unwrap();

        let object = store.get("1-cat.png").await.unwrap();
        assert_eq!(object.content_type, "image/png");
        assert_eq!(object.content_length, Some(4));
        assert_eq!(read_all(object).await, b"meow");

        store.remove("1-cat.png").await.unwrap();
        // Second delete sees 404 and still succeeds.
        store.remove("1-cat.png").await.unwrap();

        let err = store.get("1-cat.png").await.unwrap_err();
        assert_eq!(err.kind(), ObjectErrorKind::NotFound);
    }

    #[tokio::test]
    async fn put_never_replaces_an_existing_object() {
        let store = HttpObjectStore::new(spawn_remote().await, "uploads").unwrap();
        store
            .put("1-a.png", Bytes::from_static(b"first"), "image/png")
            .await
            .unwrap();

        let err = store
            .put("1-a.png", Bytes::from_static(b"second"), "image/png")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ObjectErrorKind::AlreadyExists);
        assert_eq!(read_all(store.get("1-a.png").await.unwrap()).await, b"first");
    }

    #[tokio::test]
    async fn forbidden_bucket_is_permission_denied() {
        let store = HttpObjectStore::new(spawn_remote().await, "locked").unwrap();

        let err = store
            .put("1-a.png", Bytes::from_static(b"x"), "image/png")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ObjectErrorKind::PermissionDenied);

        let err = store.remove("1-a.png").await.unwrap_err();
        assert_eq!(err.kind(), ObjectErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn unreachable_remote_is_unavailable() {
        // Port 9 on loopback is closed in test environments.
        let store = HttpObjectStore::new("http://127.0.0.1:9", "uploads").unwrap();
        let err = store.remove("k").await.unwrap_err();
        assert_eq!(err.kind(), ObjectErrorKind::Unavailable);
    }
}
