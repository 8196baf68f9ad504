use axum::{
    Extension, Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use thiserror::Error;
use tracing::{info, warn};

use plant_storage::{Credential, CredentialPlacement, DocumentStore, ObjectStore, StorageError, keys};
use plant_types::api::PhotoListResponse;
use plant_types::models::{Photo, PhotoQuery};

use crate::error::ApiError;
use crate::middleware::{Identity, bearer_token, decode_identity};
use crate::state::AppState;

/// A delete that stopped part way. The variant names the stage that failed;
/// everything before it has already happened.
#[derive(Debug, Error)]
pub enum DeleteError {
    #[error("document delete failed: {0}")]
    Document(#[source] StorageError),

    #[error("document deleted, but its image URL has no storage key: {0}")]
    Key(#[source] StorageError),

    #[error("document deleted, but object {key} is outside the owner's prefix")]
    ForeignObject { key: String },

    #[error("document deleted, but object {key} could not be removed: {source}")]
    Object {
        key: String,
        #[source]
        source: StorageError,
    },
}

/// Delete a photo's document, then its object.
///
/// The two calls are independent. A failure after the first leaves the
/// object orphaned and is reported, never retried.
pub async fn remove_photo(
    documents: &dyn DocumentStore,
    objects: &dyn ObjectStore,
    photo: &Photo,
    credential: &Credential,
) -> Result<(), DeleteError> {
    documents
        .delete(&photo.id, credential)
        .await
        .map_err(DeleteError::Document)?;

    let key = keys::key_from_retrieval_url(&photo.image_url).map_err(DeleteError::Key)?;
    if !keys::is_owned_by(&key, &photo.user_id) {
        return Err(DeleteError::ForeignObject { key });
    }

    objects
        .delete(&key, credential)
        .await
        .map_err(|source| DeleteError::Object { key, source })?;

    info!("Deleted photo {} of {}", photo.id, photo.user_id);
    Ok(())
}

/// GET /api/photos: every photo, newest first. A bearer token is optional
/// and only forwarded.
pub async fn list_gallery(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PhotoListResponse>, ApiError> {
    let credential = bearer_token(&headers).map(Credential::bearer);
    let photos = state
        .documents
        .query(&PhotoQuery::all(), credential.as_ref())
        .await
        .inspect_err(|e| warn!("Gallery query failed: {}", e))?;

    Ok(Json(PhotoListResponse { photos }))
}

/// GET /api/profile/photos: the caller's photos, newest first.
pub async fn list_profile(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<PhotoListResponse>, ApiError> {
    let photos = state
        .documents
        .query(&PhotoQuery::owned_by(&identity.uid), Some(&identity.credential))
        .await
        .inspect_err(|e| warn!("Profile query for {} failed: {}", identity.uid, e))?;

    Ok(Json(PhotoListResponse { photos }))
}

/// DELETE /api/photos/{id}
pub async fn delete_photo(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let photo = match state.documents.get(&id, Some(&identity.credential)).await {
        Ok(photo) => photo,
        Err(e) if e.is_not_found() => return Err(ApiError::NotFound),
        Err(e) => {
            warn!("Lookup of photo {} failed: {}", id, e);
            return Err(e.into());
        }
    };

    if photo.user_id != identity.uid {
        warn!("{} tried to delete photo {} owned by {}", identity.uid, id, photo.user_id);
        return Err(ApiError::Forbidden);
    }

    remove_photo(
        state.documents.as_ref(),
        state.objects.as_ref(),
        &photo,
        &identity.credential,
    )
    .await
    .inspect_err(|e| warn!("Delete of photo {} failed: {}", id, e))?;

    Ok(StatusCode::NO_CONTENT)
}

/// Identity from a `?token=` query value, for routes that cannot carry
/// headers (browser WebSockets).
pub(crate) fn identity_from_query(token: Option<&str>) -> Result<Identity, ApiError> {
    let token = token.filter(|t| !t.is_empty()).ok_or(ApiError::Unauthorized)?;
    decode_identity(token, CredentialPlacement::Header)
}
