use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use tokio::sync::broadcast;
use tracing::{debug, error};
use uuid::Uuid;

use plant_storage::{ChangeFeed, Credential, DocumentStore, StorageError, StorageResult};
use plant_types::models::{NewPhoto, Photo, PhotoQuery};

use crate::Database;

/// [`DocumentStore`] over a local SQLite database.
///
/// Credentials are accepted and ignored. Every successful create or delete
/// notifies open subscriptions.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    db: Arc<Database>,
    changes: broadcast::Sender<()>,
}

impl SqliteDocumentStore {
    pub fn new(db: Database) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            db: Arc::new(db),
            changes,
        }
    }

    /// Run a blocking DB call off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                StorageError::Backend(e.into())
            })?
            .map_err(StorageError::Backend)
    }

    fn notify(&self) {
        let _ = self.changes.send(());
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn create(&self, photo: NewPhoto, _credential: &Credential) -> StorageResult<Photo> {
        // Rows keep microseconds; match that so the returned record equals a re-read.
        let photo = photo.into_photo(Uuid::new_v4().to_string(), Utc::now().trunc_subsecs(6));
        let row = photo.clone();
        self.blocking(move |db| {
            db.insert_photo(
                &row.id,
                &row.user_id,
                &row.user_email,
                &row.image_url,
                row.caption.as_deref(),
                row.created_at,
            )
        })
        .await?;

        debug!("Inserted photo {} for {}", photo.id, photo.user_id);
        self.notify();
        Ok(photo)
    }

    async fn get(&self, id: &str, _credential: Option<&Credential>) -> StorageResult<Photo> {
        let key = id.to_string();
        let row = self.blocking(move |db| db.get_photo(&key)).await?;
        match row {
            Some(row) => row.into_photo().map_err(StorageError::Backend),
            None => Err(StorageError::NotFound(id.to_string())),
        }
    }

    async fn delete(&self, id: &str, _credential: &Credential) -> StorageResult<()> {
        let key = id.to_string();
        let deleted = self.blocking(move |db| db.delete_photo(&key)).await?;
        if !deleted {
            return Err(StorageError::NotFound(id.to_string()));
        }

        debug!("Deleted photo {}", id);
        self.notify();
        Ok(())
    }

    async fn query(
        &self,
        query: &PhotoQuery,
        _credential: Option<&Credential>,
    ) -> StorageResult<Vec<Photo>> {
        let owner = query.owner.clone();
        let rows = self
            .blocking(move |db| db.list_photos(owner.as_deref()))
            .await?;
        let photos = rows
            .into_iter()
            .map(|row| row.into_photo())
            .collect::<anyhow::Result<Vec<_>>>()
            .map_err(StorageError::Backend)?;
        Ok(query.apply(photos))
    }

    fn changes(&self) -> ChangeFeed {
        ChangeFeed::notify(self.changes.subscribe())
    }
}
