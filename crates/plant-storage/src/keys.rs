//! Storage keys and retrieval URLs.
//!
//! A photo lives at `photos/<userId>/<unixMillis>-<fileName>`. Its retrieval
//! URL is `<base>/v0/b/<bucket>/o/<percent-encoded key>?alt=media`, and the
//! delete flow recovers the key by splitting that URL on `/o/` and `?`.

use chrono::{DateTime, Utc};

use crate::error::{StorageError, StorageResult};

/// Prefix every photo key starts with.
pub const PHOTO_PREFIX: &str = "photos";

const OBJECT_MARKER: &str = "/o/";

/// Derive the object key for an upload.
///
/// Two uploads of the same file name by the same user within one millisecond
/// map to the same key; the later write wins.
pub fn photo_key(user_id: &str, file_name: &str, uploaded_at: DateTime<Utc>) -> String {
    format!(
        "{}/{}/{}-{}",
        PHOTO_PREFIX,
        user_id,
        uploaded_at.timestamp_millis(),
        base_name(file_name)
    )
}

/// Last path component of a client-supplied file name.
pub fn base_name(file_name: &str) -> &str {
    let name = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() { "upload" } else { name }
}

/// Build the public retrieval URL for `key`.
pub fn retrieval_url(base: &str, bucket: &str, key: &str) -> String {
    format!(
        "{}/v0/b/{}/o/{}?alt=media",
        base.trim_end_matches('/'),
        bucket,
        urlencoding::encode(key)
    )
}

/// Recover the object key from a retrieval URL.
pub fn key_from_retrieval_url(url: &str) -> StorageResult<String> {
    let (_, rest) = url
        .split_once(OBJECT_MARKER)
        .ok_or_else(|| StorageError::InvalidUrl(url.to_string()))?;
    let encoded = rest.split('?').next().unwrap_or_default();
    if encoded.is_empty() {
        return Err(StorageError::InvalidUrl(url.to_string()));
    }
    let key = urlencoding::decode(encoded).map_err(|_| StorageError::InvalidUrl(url.to_string()))?;
    Ok(key.into_owned())
}

/// Whether `key` sits under the owner's photo prefix.
pub fn is_owned_by(key: &str, user_id: &str) -> bool {
    key.strip_prefix(PHOTO_PREFIX)
        .and_then(|rest| rest.strip_prefix('/'))
        .and_then(|rest| rest.strip_prefix(user_id))
        .is_some_and(|rest| rest.starts_with('/'))
}
