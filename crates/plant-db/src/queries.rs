use crate::Database;
use crate::models::PhotoRow;
use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, Row};

const PHOTO_COLUMNS: &str = "id, user_id, user_email, image_url, caption, created_at";

impl Database {
    pub fn insert_photo(
        &self,
        id: &str,
        user_id: &str,
        user_email: &str,
        image_url: &str,
        caption: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        let created_at = created_at.to_rfc3339_opts(SecondsFormat::Micros, true);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO photos (id, user_id, user_email, image_url, caption, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, user_id, user_email, image_url, caption, created_at],
            )?;
            Ok(())
        })
    }

    pub fn get_photo(&self, id: &str) -> Result<Option<PhotoRow>> {
        self.with_conn(|conn| query_photo(conn, id))
    }

    /// Returns false when no row had that id.
    pub fn delete_photo(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM photos WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    /// Newest first, optionally restricted to one uploader.
    pub fn list_photos(&self, owner: Option<&str>) -> Result<Vec<PhotoRow>> {
        self.with_conn(|conn| query_photos(conn, owner))
    }
}

fn photo_row(row: &Row<'_>) -> rusqlite::Result<PhotoRow> {
    Ok(PhotoRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        user_email: row.get(2)?,
        image_url: row.get(3)?,
        caption: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn query_photo(conn: &Connection, id: &str) -> Result<Option<PhotoRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {PHOTO_COLUMNS} FROM photos WHERE id = ?1"))?;
    let row = stmt.query_row([id], photo_row).optional()?;
    Ok(row)
}

fn query_photos(conn: &Connection, owner: Option<&str>) -> Result<Vec<PhotoRow>> {
    let rows = match owner {
        Some(owner) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PHOTO_COLUMNS} FROM photos
                 WHERE user_id = ?1
                 ORDER BY created_at DESC"
            ))?;
            let rows = stmt
                .query_map([owner], photo_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PHOTO_COLUMNS} FROM photos ORDER BY created_at DESC"
            ))?;
            let rows = stmt
                .query_map([], photo_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
