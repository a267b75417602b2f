use crate::models::{MessageRow, UserRow};
use crate::Database;
use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Connection;

/// Fixed-width UTC timestamps so lexical and chronological order agree.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.fZ")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .map(|ndt| ndt.and_utc())
        .map_err(|e| anyhow!("bad timestamp '{}': {}", raw, e))
}

/// Fields of a message row known before insertion.
pub struct InsertMessage<'a> {
    pub id: &'a str,
    pub channel_id: &'a str,
    pub sender_id: &'a str,
    pub sender_name: &'a str,
    pub original_text: &'a str,
    pub source_language: &'a str,
    pub pivot_text: &'a str,
}

impl Database {
    // -- Users --

    /// Create or rename a user profile. The language preference is only set
    /// on first insert.
    pub fn upsert_user(&self, id: &str, name: &str, preferred_language: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, preferred_language) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name",
                (id, name, preferred_language),
            )?;
            Ok(())
        })
    }

    pub fn set_preferred_language(&self, id: &str, language: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE users SET preferred_language = ?2 WHERE id = ?1",
                (id, language),
            )?;
            if updated == 0 {
                return Err(anyhow!("User not found: {}", id));
            }
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    /// Returns false when the user does not exist.
    pub fn update_user_location(&self, id: &str, lat: f64, lng: f64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE users
                 SET location_lat = ?2, location_lng = ?3, location_updated_at = ?4
                 WHERE id = ?1",
                rusqlite::params![id, lat, lng, format_timestamp(Utc::now())],
            )?;
            Ok(updated > 0)
        })
    }

    // -- Channel membership --

    pub fn add_channel_member(&self, channel_id: &str, user_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO channel_members (channel_id, user_id) VALUES (?1, ?2)",
                (channel_id, user_id),
            )?;
            Ok(())
        })
    }

    pub fn is_channel_member(&self, channel_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM channel_members WHERE channel_id = ?1 AND user_id = ?2",
                    (channel_id, user_id),
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    // -- Messages --

    /// Append a message. The creation time is clamped to the channel's latest
    /// so it never decreases even if the wall clock steps back.
    pub fn insert_message(&self, msg: InsertMessage<'_>) -> Result<MessageRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let last: Option<String> = tx
                .query_row(
                    "SELECT created_at FROM messages WHERE channel_id = ?1 ORDER BY seq DESC LIMIT 1",
                    [msg.channel_id],
                    |row| row.get(0),
                )
                .optional()?;

            let now = Utc::now();
            let created_at = match last.as_deref().map(parse_timestamp).transpose()? {
                Some(last) if last > now => last,
                _ => now,
            };
            let created_at = format_timestamp(created_at);

            tx.execute(
                "INSERT INTO messages
                    (id, channel_id, sender_id, sender_name, original_text, source_language, pivot_text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    msg.id,
                    msg.channel_id,
                    msg.sender_id,
                    msg.sender_name,
                    msg.original_text,
                    msg.source_language,
                    msg.pivot_text,
                    created_at,
                ],
            )?;
            let seq = tx.last_insert_rowid();
            tx.commit()?;

            Ok(MessageRow {
                seq,
                id: msg.id.to_string(),
                channel_id: msg.channel_id.to_string(),
                sender_id: msg.sender_id.to_string(),
                sender_name: msg.sender_name.to_string(),
                original_text: msg.original_text.to_string(),
                source_language: msg.source_language.to_string(),
                pivot_text: msg.pivot_text.to_string(),
                created_at,
            })
        })
    }

    pub fn get_messages(&self, channel_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_messages(conn, channel_id))
    }
}

fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, preferred_language, location_lat, location_lng FROM users WHERE id = ?1",
    )?;

    let row = stmt
        .query_row([id], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                name: row.get(1)?,
                preferred_language: row.get(2)?,
                location_lat: row.get(3)?,
                location_lng: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_messages(conn: &Connection, channel_id: &str) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT seq, id, channel_id, sender_id, sender_name, original_text, source_language, pivot_text, created_at
         FROM messages
         WHERE channel_id = ?1
         ORDER BY seq ASC",
    )?;

    let rows = stmt
        .query_map([channel_id], |row| {
            Ok(MessageRow {
                seq: row.get(0)?,
                id: row.get(1)?,
                channel_id: row.get(2)?,
                sender_id: row.get(3)?,
                sender_name: row.get(4)?,
                original_text: row.get(5)?,
                source_language: row.get(6)?,
                pivot_text: row.get(7)?,
                created_at: row.get(8)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

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

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(db: &Database, id: &str, channel: &str, text: &str) -> MessageRow {
        db.insert_message(InsertMessage {
            id,
            channel_id: channel,
            sender_id: "u1",
            sender_name: "Asha",
            original_text: text,
            source_language: "en",
            pivot_text: text,
        })
        .unwrap()
    }

    #[test]
    fn messages_come_back_in_insertion_order() {
        let db = Database::open_in_memory().unwrap();
        insert(&db, "m1", "ride-A", "first");
        insert(&db, "m2", "ride-B", "elsewhere");
        insert(&db, "m3", "ride-A", "second");

        let rows = db.get_messages("ride-A").unwrap();
        let texts: Vec<_> = rows.iter().map(|r| r.original_text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
        assert!(rows[0].seq < rows[1].seq);
    }

    #[test]
    fn created_at_never_decreases_within_a_channel() {
        let db = Database::open_in_memory().unwrap();

        // A row stamped in the future stands in for a clock that stepped back.
        let future = format_timestamp(Utc::now() + chrono::Duration::hours(1));
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, channel_id, sender_id, sender_name, original_text, pivot_text, created_at)
                 VALUES ('m0', 'ride-A', 'u1', 'Asha', 'x', 'x', ?1)",
                [&future],
            )?;
            Ok(())
        })
        .unwrap();

        let row = insert(&db, "m1", "ride-A", "later");
        assert_eq!(row.created_at, future);

        let other = insert(&db, "m2", "ride-B", "unaffected");
        assert!(parse_timestamp(&other.created_at).unwrap() < parse_timestamp(&future).unwrap());
    }

    #[test]
    fn timestamps_round_trip_at_microsecond_precision() {
        let raw = "2026-03-01T10:15:30.123456Z";
        let parsed = parse_timestamp(raw).unwrap();
        assert_eq!(format_timestamp(parsed), raw);
    }

    #[test]
    fn upsert_keeps_existing_language_preference() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_user("u1", "Asha", "hi").unwrap();
        db.upsert_user("u1", "Asha R", "en").unwrap();

        let user = db.get_user_by_id("u1").unwrap().unwrap();
        assert_eq!(user.name, "Asha R");
        assert_eq!(user.preferred_language, "hi");

        db.set_preferred_language("u1", "es").unwrap();
        assert_eq!(db.get_user_by_id("u1").unwrap().unwrap().preferred_language, "es");
        assert!(db.set_preferred_language("ghost", "es").is_err());
    }

    #[test]
    fn location_update_requires_existing_user() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_user("u1", "Asha", "en").unwrap();

        assert!(db.update_user_location("u1", 20.29, 85.82).unwrap());
        assert!(!db.update_user_location("ghost", 1.0, 2.0).unwrap());

        let user = db.get_user_by_id("u1").unwrap().unwrap();
        assert_eq!(user.location_lat, Some(20.29));
        assert_eq!(user.location_lng, Some(85.82));
    }

    #[test]
    fn membership_is_per_channel() {
        let db = Database::open_in_memory().unwrap();
        db.add_channel_member("ride-A", "u1").unwrap();
        db.add_channel_member("ride-A", "u1").unwrap();

        assert!(db.is_channel_member("ride-A", "u1").unwrap());
        assert!(!db.is_channel_member("ride-B", "u1").unwrap());
    }
}
