use serde::{Deserialize, Serialize};

use crate::models::Photo;

// -- Identity --

/// Claims read out of an identity-provider ID token.
///
/// Firebase tokens carry the uid both as `sub` and `user_id`; `sub` wins.
/// Either may be missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    #[serde(default)]
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub exp: usize,
}

// -- Upload --

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    pub photo: Photo,
}

// -- Listings --

#[derive(Debug, Serialize, Deserialize)]
pub struct PhotoListResponse {
    pub photos: Vec<Photo>,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
