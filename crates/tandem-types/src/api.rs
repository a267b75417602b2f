use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Language, Message};

// -- JWT Claims --

/// Bearer token claims. Tokens are issued by the account service; the relay
/// only verifies them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

// -- Messages --

/// A message as one particular reader sees it. Shared by live delivery and
/// history reads so clients render both identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveredMessage {
    pub id: Uuid,
    pub channel_id: String,
    pub author_id: String,
    pub author: String,
    pub original_message: String,
    pub translated_message: String,
    pub source_language: Language,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl DeliveredMessage {
    pub fn from_message(message: &Message, translated_message: String) -> Self {
        Self {
            id: message.id,
            channel_id: message.channel_id.clone(),
            author_id: message.sender_id.clone(),
            author: message.sender_display_name.clone(),
            original_message: message.original_text.clone(),
            translated_message,
            source_language: message.source_language,
            created_at: message.created_at,
        }
    }
}
