use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id                  TEXT PRIMARY KEY,
            name                TEXT NOT NULL,
            preferred_language  TEXT NOT NULL DEFAULT 'en',
            location_lat        REAL,
            location_lng        REAL,
            location_updated_at TEXT,
            created_at          TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS channel_members (
            channel_id  TEXT NOT NULL,
            user_id     TEXT NOT NULL,
            joined_at   TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (channel_id, user_id)
        );

        -- seq is the canonical order; created_at is clamped so it never goes
        -- backwards within a channel.
        CREATE TABLE IF NOT EXISTS messages (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,
            id              TEXT NOT NULL UNIQUE,
            channel_id      TEXT NOT NULL,
            sender_id       TEXT NOT NULL,
            sender_name     TEXT NOT NULL,
            original_text   TEXT NOT NULL,
            source_language TEXT NOT NULL DEFAULT 'en',
            pivot_text      TEXT NOT NULL,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_channel
            ON messages(channel_id, seq);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
