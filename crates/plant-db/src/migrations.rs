use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS photos (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL,
            user_email  TEXT NOT NULL DEFAULT '',
            image_url   TEXT NOT NULL,
            caption     TEXT,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_photos_created
            ON photos(created_at DESC);

        CREATE INDEX IF NOT EXISTS idx_photos_user
            ON photos(user_id, created_at DESC);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
