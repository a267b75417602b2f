//! Collaborator contracts backed by SQLite. Every call runs on the blocking
//! pool so the async runtime never waits on the connection mutex.

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use tandem_types::models::{Coordinates, Language, Message, NewMessage};
use tandem_types::store::{
    ChannelMembershipStore, MessageStore, StoreError, StoreResult, UserProfileStore,
};

use crate::Database;
use crate::models::MessageRow;
use crate::queries::{InsertMessage, parse_timestamp};

async fn blocking<F, T>(f: F) -> StoreResult<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Unavailable(format!("spawn_blocking join error: {}", e)))?
        .map_err(|e| StoreError::Unavailable(e.to_string()))
}

fn row_to_message(row: MessageRow) -> Message {
    Message {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt message id '{}': {}", row.id, e);
            Uuid::default()
        }),
        source_language: row.source_language.parse().unwrap_or_else(|e| {
            warn!("Corrupt source_language on message '{}': {}", row.id, e);
            Language::FALLBACK
        }),
        created_at: parse_timestamp(&row.created_at).unwrap_or_else(|e| {
            warn!("Corrupt created_at on message '{}': {}", row.id, e);
            chrono::DateTime::default()
        }),
        channel_id: row.channel_id,
        sender_id: row.sender_id,
        sender_display_name: row.sender_name,
        original_text: row.original_text,
        pivot_text: row.pivot_text,
    }
}

#[async_trait]
impl UserProfileStore for Database {
    async fn preferred_language(&self, user_id: &str) -> StoreResult<Language> {
        let db = self.clone();
        let uid = user_id.to_string();
        let user = blocking(move || db.get_user_by_id(&uid)).await?;

        Ok(user
            .map(|u| Language::from_code_or_pivot(&u.preferred_language))
            .unwrap_or(Language::PIVOT))
    }

    async fn update_location(&self, user_id: &str, location: Coordinates) -> StoreResult<()> {
        let db = self.clone();
        let uid = user_id.to_string();
        let found =
            blocking(move || db.update_user_location(&uid, location.lat, location.lng)).await?;

        // No profile yet: nothing to remember, the broadcast still goes out.
        if !found {
            debug!("No profile for {}, location not stored", user_id);
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelMembershipStore for Database {
    async fn is_member(&self, channel_id: &str, user_id: &str) -> StoreResult<bool> {
        let db = self.clone();
        let cid = channel_id.to_string();
        let uid = user_id.to_string();
        blocking(move || db.is_channel_member(&cid, &uid)).await
    }
}

#[async_trait]
impl MessageStore for Database {
    async fn append(&self, message: NewMessage) -> StoreResult<Message> {
        let db = self.clone();
        let row = blocking(move || {
            let id = Uuid::new_v4().to_string();
            db.insert_message(InsertMessage {
                id: &id,
                channel_id: &message.channel_id,
                sender_id: &message.sender_id,
                sender_name: &message.sender_display_name,
                original_text: &message.original_text,
                source_language: message.source_language.code(),
                pivot_text: &message.pivot_text,
            })
        })
        .await?;

        Ok(row_to_message(row))
    }

    async fn list_by_channel(&self, channel_id: &str) -> StoreResult<Vec<Message>> {
        let db = self.clone();
        let cid = channel_id.to_string();
        let rows = blocking(move || db.get_messages(&cid)).await?;
        Ok(rows.into_iter().map(row_to_message).collect())
    }
}
