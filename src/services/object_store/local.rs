//! Disk-backed object store.
//!
//! Payloads live under `root/{shard}/{shard}/{key}`, where the shards are the
//! first two bytes of `md5(key)` in hex. Writes land in a temp file that is
//! fsynced and then linked into place, so a key never points at a partial
//! payload and an existing key is never overwritten.

use super::{ObjectResult, ObjectStore, ObjectStoreError, StoredObject, ensure_key_safe};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    /// Use `root` as the store directory, creating it if needed.
    pub async fn open(root: impl Into<PathBuf>) -> ObjectResult<Self> {
        let root = root.into();
        if !root.exists() {
            fs::create_dir_all(&root)
                .await
                .map_err(|err| ObjectStoreError::from_io(root.display().to_string(), err))?;
            tracing::info!("Created storage directory at {}", root.display());
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Two-level shard names for a key, `00`–`ff` each.
    fn object_shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(key);
        let mut path = self.root.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    /// Remove empty shard directories between `start` and the store root.
    async fn prune_empty_dirs(&self, start: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(&self.root) && current != self.root {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn describe(&self) -> String {
        format!("local:{}", self.root.display())
    }

    async fn put(&self, key: &str, bytes: Bytes, _content_type: &str) -> ObjectResult<()> {
        ensure_key_safe(key)?;
        let file_path = self.object_path(key);
        let io_err = |err| ObjectStoreError::from_io(key, err);

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let tmp_path = file_path.with_file_name(format!(".tmp-{}", Uuid::new_v4()));

        let written = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(&bytes).await?;
            file.flush().await?;
            file.sync_all().await?;
            // Fails with AlreadyExists instead of replacing a live object.
            fs::hard_link(&tmp_path, &file_path).await
        }
        .await;

        let _ = fs::remove_file(&tmp_path).await;
        written.map_err(io_err)?;

        debug!("stored object {} ({} bytes)", file_path.display(), bytes.len());
        Ok(())
    }

    async fn get(&self, key: &str) -> ObjectResult<StoredObject> {
        ensure_key_safe(key)?;
        let file_path = self.object_path(key);
        let file = File::open(&file_path)
            .await
            .map_err(|err| ObjectStoreError::from_io(key, err))?;
        let content_length = file.metadata().await.ok().map(|meta| meta.len());

        Ok(StoredObject {
            content_type: content_type_for(key).to_string(),
            content_length,
            body: ReaderStream::new(file).boxed(),
        })
    }

    async fn remove(&self, key: &str) -> ObjectResult<()> {
        ensure_key_safe(key)?;
        let file_path = self.object_path(key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(ObjectStoreError::from_io(key, err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent).await;
        }
        Ok(())
    }

    async fn probe(&self) -> ObjectResult<()> {
        let tmp_path = self.root.join(format!(".probe-{}", Uuid::new_v4()));
        let key = tmp_path.display().to_string();

        fs::write(&tmp_path, b"probe")
            .await
            .map_err(|err| ObjectStoreError::from_io(&key, err))?;
        let read = fs::read(&tmp_path).await;
        let _ = fs::remove_file(&tmp_path).await;

        match read {
            Ok(bytes) if bytes == b"probe" => Ok(()),
            Ok(_) => Err(ObjectStoreError::new(
                super::ObjectErrorKind::Unavailable,
                key,
                "probe content mismatch",
            )),
            Err(err) => Err(ObjectStoreError::from_io(key, err)),
        }
    }
}

/// Content type served for a key, from its extension.
fn content_type_for(key: &str) -> &'static str {
    let ext = key
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "avif" => "image/avif",
        _ => "application/octet-stream",
    }
}
