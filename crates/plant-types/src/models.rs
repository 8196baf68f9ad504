use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A photo record as held by the document store.
///
/// Every field is written once at creation. `created_at` is assigned by the
/// store and is the only ordering key for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub user_email: String,
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied by the caller when creating a record. The store adds `id`
/// and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPhoto {
    pub user_id: String,
    pub user_email: String,
    pub image_url: String,
    pub caption: Option<String>,
}

impl NewPhoto {
    pub fn into_photo(self, id: String, created_at: DateTime<Utc>) -> Photo {
        Photo {
            id,
            user_id: self.user_id,
            user_email: self.user_email,
            image_url: self.image_url,
            caption: self.caption,
            created_at,
        }
    }
}

/// A listing over the photo collection, always ordered by `createdAt`
/// descending. `owner: None` lists every record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PhotoQuery {
    pub owner: Option<String>,
}

impl PhotoQuery {
    /// Every record in the collection (the gallery).
    pub fn all() -> Self {
        Self { owner: None }
    }

    /// Records uploaded by one identity (the profile).
    pub fn owned_by(user_id: impl Into<String>) -> Self {
        Self {
            owner: Some(user_id.into()),
        }
    }

    pub fn matches(&self, photo: &Photo) -> bool {
        match &self.owner {
            Some(owner) => photo.user_id == *owner,
            None => true,
        }
    }

    /// Filter and order a materialized result set.
    ///
    /// Backends that already filter and sort upstream still pass their rows
    /// through here so every listing comes out newest first.
    pub fn apply(&self, photos: impl IntoIterator<Item = Photo>) -> Vec<Photo> {
        let mut out: Vec<Photo> = photos.into_iter().filter(|p| self.matches(p)).collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }
}
