use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};

use crate::credential::Credential;
use crate::error::{StorageError, StorageResult};
use crate::keys;
use crate::traits::ObjectStore;

/// Object store backed by a local directory.
///
/// Bytes live at `{root}/objects/{key}` and the content type at
/// `{root}/meta/{key}.json`. Retrieval URLs keep the platform's
/// `/v0/b/{bucket}/o/{key}?alt=media` shape, rooted at the service's own
/// public URL, which serves them back out of this store.
pub struct LocalObjectStore {
    root: PathBuf,
    bucket: String,
    public_url: String,
}

/// An object read back from disk.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
}

#[derive(Serialize, Deserialize)]
struct ObjectMeta {
    content_type: String,
}

impl LocalObjectStore {
    pub async fn new(root: PathBuf, bucket: impl Into<String>, public_url: impl Into<String>) -> StorageResult<Self> {
        fs::create_dir_all(root.join("objects")).await?;
        fs::create_dir_all(root.join("meta")).await?;
        info!("Local object storage directory: {}", root.display());
        Ok(Self {
            root,
            bucket: bucket.into(),
            public_url: public_url.into(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Path to the bytes of `key`. Rejects keys that would escape the root.
    pub fn object_path(&self, key: &str) -> StorageResult<PathBuf> {
        Ok(self.root.join("objects").join(checked_key(key)?))
    }

    fn meta_path(&self, key: &str) -> StorageResult<PathBuf> {
        Ok(self.root.join("meta").join(format!("{}.json", checked_key(key)?.display())))
    }

    /// Read an object and its content type.
    pub async fn read(&self, key: &str) -> StorageResult<StoredObject> {
        let path = self.object_path(key)?;
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let content_type = match fs::read(self.meta_path(key)?).await {
            Ok(raw) => serde_json::from_slice::<ObjectMeta>(&raw)
                .map(|m| m.content_type)
                .unwrap_or_else(|e| {
                    warn!("Unreadable metadata for {}: {}", key, e);
                    crate::traits::FALLBACK_CONTENT_TYPE.to_string()
                }),
            Err(_) => crate::traits::FALLBACK_CONTENT_TYPE.to_string(),
        };

        Ok(StoredObject { data, content_type })
    }

    /// Whether an object exists at `key`.
    pub async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(fs::try_exists(self.object_path(key)?).await?)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        _credential: &Credential,
    ) -> StorageResult<()> {
        let path = self.object_path(key)?;
        let meta_path = self.meta_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        if let Some(parent) = meta_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::write(&path, &data).await?;
        let meta = serde_json::to_vec(&ObjectMeta {
            content_type: content_type.to_string(),
        })
        .map_err(|e| StorageError::Backend(e.into()))?;
        fs::write(&meta_path, meta).await?;

        info!("Stored {} ({} bytes, {})", key, data.len(), content_type);
        Ok(())
    }

    async fn delete(&self, key: &str, _credential: &Credential) -> StorageResult<()> {
        let path = self.object_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = fs::remove_file(self.meta_path(key)?).await {
            warn!("Metadata for {} not removed: {}", key, e);
        }

        info!("Deleted object {}", key);
        Ok(())
    }

    fn retrieval_url(&self, key: &str) -> String {
        keys::retrieval_url(&self.public_url, &self.bucket, key)
    }
}

/// Keys are relative, slash-separated, with no `.`/`..` or empty segments.
fn checked_key(key: &str) -> StorageResult<&Path> {
    let bad_segment = key
        .split('/')
        .any(|seg| seg.is_empty() || seg == "." || seg == ".." || seg.contains('\\'));
    if bad_segment {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    let path = Path::new(key);
    if !path.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(path)
}
