#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use record_store::{
    AppState, RecordService,
    models::Endpoint,
    services::{
        backend::{EmbeddedBackend, RecordBackend, RecordTarget, ReplicatedBackend, SqliteTarget},
        object_store::{
            LocalObjectStore, ObjectErrorKind, ObjectResult, ObjectStore, ObjectStoreError,
            StoredObject,
        },
    },
};
use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tempfile::TempDir;

pub const PRIMARY: &str = "primary.test";
pub const REPLICA: &str = "replica.test";

pub async fn sqlite_target(path: &Path, host: &str, port: u16) -> Arc<SqliteTarget> {
    let target = SqliteTarget::open(path, 4)
        .await
        .unwrap()
        .with_endpoint(Endpoint::new(host, Some(port)));
    Arc::new(target)
}

/// Primary and replica targets plus the backend built on them.
pub struct Pair {
    pub primary: Arc<SqliteTarget>,
    pub replica: Arc<SqliteTarget>,
    pub backend: Arc<ReplicatedBackend>,
}

/// Replica and primary open the same file: replication with zero lag.
pub async fn shared_pair(dir: &TempDir) -> Pair {
    let file = dir.path().join("shared.db");
    let primary = sqlite_target(&file, PRIMARY, 3306).await;
    let replica = sqlite_target(&file, REPLICA, 3307).await;
    pair(primary, replica).await
}

/// Replica has its own empty file with no `images` table, so every replica
/// read fails.
pub async fn broken_replica_pair(dir: &TempDir) -> Pair {
    let primary = sqlite_target(&dir.path().join("primary.db"), PRIMARY, 3306).await;
    let replica = sqlite_target(&dir.path().join("replica.db"), REPLICA, 3307).await;
    pair(primary, replica).await
}

async fn pair(primary: Arc<SqliteTarget>, replica: Arc<SqliteTarget>) -> Pair {
    let backend = Arc::new(ReplicatedBackend::new(
        primary.clone() as Arc<dyn RecordTarget>,
        replica.clone() as Arc<dyn RecordTarget>,
    ));
    backend.init_schema().await.unwrap();
    Pair {
        primary,
        replica,
        backend,
    }
}

pub async fn embedded_backend(dir: &TempDir) -> Arc<EmbeddedBackend> {
    let target = SqliteTarget::open(dir.path().join("app.db"), 4).await.unwrap();
    let backend = Arc::new(EmbeddedBackend::new(target));
    backend.init_schema().await.unwrap();
    backend
}

pub async fn local_store(dir: &TempDir) -> Arc<LocalObjectStore> {
    Arc::new(LocalObjectStore::open(dir.path().join("uploads")).await.unwrap())
}

pub fn service(backend: Arc<dyn RecordBackend>, objects: Arc<dyn ObjectStore>) -> RecordService {
    RecordService::new(backend, objects)
}

pub fn state(records: RecordService) -> AppState {
    AppState::new(records, "1", 8000)
}

/// Number of regular files anywhere below `dir`.
pub fn count_files(dir: &Path) -> usize {
    if !dir.exists() {
        return 0;
    }
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .map(|path| {
            if path.is_dir() {
                count_files(&path)
            } else {
                1
            }
        })
        .sum()
}

/// Object store whose operations fail with a chosen kind, counting calls.
pub struct FailingStore {
    pub kind: ObjectErrorKind,
    pub fail_put: bool,
    pub fail_remove: bool,
    /// Number of upcoming puts to reject as `AlreadyExists`.
    pub taken: AtomicUsize,
    pub puts: AtomicUsize,
    pub removes: AtomicUsize,
    inner: Arc<LocalObjectStore>,
}

impl FailingStore {
    pub fn new(inner: Arc<LocalObjectStore>, kind: ObjectErrorKind) -> Self {
        Self {
            kind,
            fail_put: false,
            fail_remove: false,
            taken: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
            removes: AtomicUsize::new(0),
            inner,
        }
    }
}

#[async_trait]
impl ObjectStore for FailingStore {
    fn describe(&self) -> String {
        "failing".into()
    }

    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> ObjectResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_put {
            return Err(ObjectStoreError::new(self.kind, key, "injected"));
        }
        let taken = self
            .taken
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if taken.is_ok() {
            return Err(ObjectStoreError::new(
                ObjectErrorKind::AlreadyExists,
                key,
                "taken",
            ));
        }
        self.inner.put(key, bytes, content_type).await
    }

    async fn get(&self, key: &str) -> ObjectResult<StoredObject> {
        self.inner.get(key).await
    }

    async fn remove(&self, key: &str) -> ObjectResult<()> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        if self.fail_remove {
            return Err(ObjectStoreError::new(self.kind, key, "injected"));
        }
        self.inner.remove(key).await
    }

    async fn probe(&self) -> ObjectResult<()> {
        self.inner.probe().await
    }
}
