//! View models over live subscriptions.
//!
//! A view holds the latest full snapshot of its query. Every delivery
//! replaces the whole list; nothing is merged. Dropping a view drops its
//! [`Subscription`], which stops the background query task.

use std::sync::Arc;

use tracing::debug;

use plant_storage::{Credential, DocumentStore, ObjectStore, StorageResult, Subscription};
use plant_types::models::{Photo, PhotoQuery};

use crate::error::ApiError;
use crate::middleware::Identity;
use crate::photos::{DeleteError, remove_photo};

struct Feed {
    subscription: Subscription,
    photos: Vec<Photo>,
    loaded: bool,
}

impl Feed {
    fn open(documents: Arc<dyn DocumentStore>, query: PhotoQuery, credential: Option<Credential>) -> Self {
        Self {
            subscription: Subscription::open(documents, query, credential),
            photos: Vec::new(),
            loaded: false,
        }
    }

    async fn next_snapshot(&mut self) -> StorageResult<&[Photo]> {
        let snapshot = self.subscription.changed().await?;
        self.photos = snapshot.photos;
        self.loaded = snapshot.loaded;
        Ok(&self.photos)
    }
}

/// Every photo, newest first.
pub struct GalleryView {
    feed: Feed,
}

impl GalleryView {
    pub fn open(documents: Arc<dyn DocumentStore>, credential: Option<Credential>) -> Self {
        Self {
            feed: Feed::open(documents, PhotoQuery::all(), credential),
        }
    }

    pub fn photos(&self) -> &[Photo] {
        &self.feed.photos
    }

    /// True until the first snapshot has been delivered.
    pub fn is_loading(&self) -> bool {
        !self.feed.loaded
    }

    /// Wait for the next snapshot and replace the list with it.
    pub async fn next_snapshot(&mut self) -> StorageResult<&[Photo]> {
        self.feed.next_snapshot().await
    }
}

/// One identity's photos, newest first, with delete.
pub struct ProfileView {
    feed: Feed,
    identity: Identity,
    documents: Arc<dyn DocumentStore>,
    objects: Arc<dyn ObjectStore>,
}

impl ProfileView {
    pub fn open(
        documents: Arc<dyn DocumentStore>,
        objects: Arc<dyn ObjectStore>,
        identity: Identity,
    ) -> Self {
        let feed = Feed::open(
            documents.clone(),
            PhotoQuery::owned_by(&identity.uid),
            Some(identity.credential.clone()),
        );
        Self {
            feed,
            identity,
            documents,
            objects,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn photos(&self) -> &[Photo] {
        &self.feed.photos
    }

    pub fn is_loading(&self) -> bool {
        !self.feed.loaded
    }

    pub async fn next_snapshot(&mut self) -> StorageResult<&[Photo]> {
        self.feed.next_snapshot().await
    }

    /// Delete a photo currently listed in this view.
    ///
    /// Once the document delete succeeds the photo leaves the local list,
    /// even if the object delete then fails. It is never put back; the next
    /// snapshot is authoritative.
    pub async fn delete(&mut self, id: &str) -> Result<(), ApiError> {
        let photo = self
            .feed
            .photos
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or(ApiError::NotFound)?;

        let result = remove_photo(
            self.documents.as_ref(),
            self.objects.as_ref(),
            &photo,
            &self.identity.credential,
        )
        .await;

        if !matches!(result, Err(DeleteError::Document(_))) {
            self.feed.photos.retain(|p| p.id != id);
            debug!("Dropped photo {} from {}'s profile view", id, self.identity.uid);
        }

        result.map_err(ApiError::from)
    }
}
