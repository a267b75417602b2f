//! Narrow contracts for the collaborators the relay depends on.
//!
//! The relay never owns users or rides; it only reads a user's language,
//! records their last position, checks durable membership and appends to the
//! message log.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Coordinates, Language, Message, NewMessage};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait UserProfileStore: Send + Sync {
    /// Current preference. Unknown users and unsupported codes resolve to the
    /// pivot language.
    async fn preferred_language(&self, user_id: &str) -> StoreResult<Language>;

    /// Record the user's latest position, replacing any previous one.
    async fn update_location(&self, user_id: &str, location: Coordinates) -> StoreResult<()>;
}

#[async_trait]
pub trait ChannelMembershipStore: Send + Sync {
    async fn is_member(&self, channel_id: &str, user_id: &str) -> StoreResult<bool>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a record, assigning its id and creation time. Creation times are
    /// non-decreasing within a channel.
    async fn append(&self, message: NewMessage) -> StoreResult<Message>;

    /// All messages of a channel in insertion order.
    async fn list_by_channel(&self, channel_id: &str) -> StoreResult<Vec<Message>>;
}
