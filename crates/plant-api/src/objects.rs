use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use tracing::warn;

use plant_storage::StorageError;

use crate::error::ApiError;
use crate::state::AppState;

/// GET /v0/b/{bucket}/o/{key}: serve a locally stored object under its
/// retrieval URL. Answers only in local mode; with a remote object store
/// every request is a 404.
pub async fn serve_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let local = state.local_objects.as_ref().ok_or(ApiError::NotFound)?;
    if bucket != local.bucket() {
        return Err(ApiError::NotFound);
    }

    let object = local.read(&key).await.map_err(|e| match e {
        StorageError::NotFound(_) | StorageError::InvalidKey(_) => ApiError::NotFound,
        e => {
            warn!("Reading object {} failed: {}", key, e);
            ApiError::from(e)
        }
    })?;

    Ok(([(header::CONTENT_TYPE, object.content_type)], object.data).into_response())
}
