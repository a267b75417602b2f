use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use tandem_types::models::{ConnectionId, LiveMember, PresenceEntry};

/// Which live connections are watching which channel.
///
/// Separate from durable ride membership: a member who
/// is offline has no entry here and catches up through history instead.
#[async_trait]
pub trait PresenceRegistry: Send + Sync {
    /// Upsert. A connection that joins again simply moves to the new channel.
    async fn join(&self, connection_id: ConnectionId, user_id: String, channel_id: String);

    /// Remove and return the connection's entry, if any.
    async fn leave(&self, connection_id: ConnectionId) -> Option<PresenceEntry>;

    async fn entry(&self, connection_id: ConnectionId) -> Option<PresenceEntry>;

    /// Snapshot of the channel's live connections at a single instant.
    async fn members_of(&self, channel_id: &str) -> Vec<LiveMember>;
}

/// Process-local registry. Reads and writes go through one lock, so a
/// snapshot never mixes states from before and after a join or leave.
#[derive(Default)]
pub struct InMemoryPresence {
    entries: RwLock<HashMap<ConnectionId, PresenceEntry>>,
}

impl InMemoryPresence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PresenceRegistry for InMemoryPresence {
    async fn join(&self, connection_id: ConnectionId, user_id: String, channel_id: String) {
        self.entries
            .write()
            .await
            .insert(connection_id, PresenceEntry { user_id, channel_id });
    }

    async fn leave(&self, connection_id: ConnectionId) -> Option<PresenceEntry> {
        self.entries.write().await.remove(&connection_id)
    }

    async fn entry(&self, connection_id: ConnectionId) -> Option<PresenceEntry> {
        self.entries.read().await.get(&connection_id).cloned()
    }

    async fn members_of(&self, channel_id: &str) -> Vec<LiveMember> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|(_, entry)| entry.channel_id == channel_id)
            .map(|(&connection_id, entry)| LiveMember {
                connection_id,
                user_id: entry.user_id.clone(),
            })
            .collect()
    }
}
