use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use plant_storage::StorageError;
use plant_types::api::ErrorResponse;

use crate::photos::DeleteError;

/// Every failure a handler can end in. Rendered as `{"error": "<message>"}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing required fields")]
    MissingFields,

    #[error("Invalid upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Photo not found")]
    NotFound,

    #[error("Failed to upload to Storage")]
    ObjectWrite(#[source] StorageError),

    /// The object at `key` was written and is now orphaned.
    #[error("Failed to save photo metadata")]
    MetadataWrite {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("Failed to delete photo")]
    Delete(#[from] DeleteError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] StorageError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingFields => StatusCode::BAD_REQUEST,
            Self::Multipart(e) => e.status(),
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::ObjectWrite(_) | Self::MetadataWrite { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Delete(DeleteError::Document(e)) if e.is_not_found() => StatusCode::NOT_FOUND,
            Self::Delete(_) => StatusCode::BAD_GATEWAY,
            Self::Upstream(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
