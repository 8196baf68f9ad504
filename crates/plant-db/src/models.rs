use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use plant_types::models::Photo;

/// A `photos` row. `created_at` is RFC 3339 with fixed microsecond precision
/// so that text order equals time order.
pub struct PhotoRow {
    pub id: String,
    pub user_id: String,
    pub user_email: String,
    pub image_url: String,
    pub caption: Option<String>,
    pub created_at: String,
}

impl PhotoRow {
    pub fn into_photo(self) -> Result<Photo> {
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .with_context(|| format!("bad created_at on photo {}", self.id))?
            .with_timezone(&Utc);
        Ok(Photo {
            id: self.id,
            user_id: self.user_id,
            user_email: self.user_email,
            image_url: self.image_url,
            caption: self.caption,
            created_at,
        })
    }
}
