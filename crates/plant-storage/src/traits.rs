//! Store trait definitions.

use async_trait::async_trait;
use bytes::Bytes;

use plant_types::models::{NewPhoto, Photo, PhotoQuery};

use crate::credential::Credential;
use crate::error::StorageResult;
use crate::live::ChangeFeed;

/// Content type used when the uploader did not send one.
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Blob storage addressed by key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `data` under `key`, replacing any existing object.
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        credential: &Credential,
    ) -> StorageResult<()>;

    /// Delete the object at `key`. Missing objects are
    /// [`crate::StorageError::NotFound`].
    async fn delete(&self, key: &str, credential: &Credential) -> StorageResult<()>;

    /// Public URL the stored object can be fetched from.
    fn retrieval_url(&self, key: &str) -> String;
}

/// The `photos` collection of the document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Append one record. The store assigns `id` and `created_at`.
    async fn create(&self, photo: NewPhoto, credential: &Credential) -> StorageResult<Photo>;

    async fn get(&self, id: &str, credential: Option<&Credential>) -> StorageResult<Photo>;

    /// Delete one record. Deleting a record that no longer exists is
    /// [`crate::StorageError::NotFound`], never a silent success.
    async fn delete(&self, id: &str, credential: &Credential) -> StorageResult<()>;

    /// Run a listing, newest first.
    async fn query(
        &self,
        query: &PhotoQuery,
        credential: Option<&Credential>,
    ) -> StorageResult<Vec<Photo>>;

    /// A fresh change feed for one subscriber.
    fn changes(&self) -> ChangeFeed;
}
