//! Storage error types.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors from either store.
///
/// Upstream failures are not classified by cause: a quota error, an expired
/// credential and a 500 from the platform all surface as [`StorageError::Upstream`].
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("upstream returned {status}: {body}")]
    Upstream { status: StatusCode, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("backend error: {0}")]
    Backend(#[from] anyhow::Error),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid retrieval URL: {0}")]
    InvalidUrl(String),

    #[error("malformed document: {0}")]
    Decode(String),

    #[error("subscription closed")]
    SubscriptionClosed,
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
