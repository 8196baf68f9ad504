//! REST clients for the hosted platform: Cloud Storage for objects and
//! Firestore for documents.

mod firestore;
mod storage;

pub use firestore::Firestore;
pub use storage::{CorsRule, FirebaseStorage};

use reqwest::{Response, StatusCode};

use crate::error::{StorageError, StorageResult};

/// Base URLs of the platform's REST surfaces. Overridable so the clients can
/// point at an emulator or a test double.
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// Media upload API (`/upload/storage/v1/...`).
    pub upload: String,
    /// Storage JSON API (`/storage/v1/...`).
    pub storage_api: String,
    /// Host of public retrieval URLs (`/v0/b/...`).
    pub download: String,
    /// Firestore REST API (`/v1/projects/...`).
    pub firestore: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            upload: "https://www.googleapis.com".into(),
            storage_api: "https://storage.googleapis.com".into(),
            download: "https://firebasestorage.googleapis.com".into(),
            firestore: "https://firestore.googleapis.com".into(),
        }
    }
}

impl Endpoints {
    /// Every surface served from one base URL.
    pub fn single(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            upload: base.clone(),
            storage_api: base.clone(),
            download: base.clone(),
            firestore: base,
        }
    }
}

/// Map a non-success response into a [`StorageError`].
async fn check(response: Response, what: &str) -> StorageResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::NOT_FOUND {
        return Err(StorageError::NotFound(what.to_string()));
    }
    Err(StorageError::Upstream { status, body })
}
