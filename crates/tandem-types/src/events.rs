use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::DeliveredMessage;
use crate::models::{ConnectionId, Coordinates};

/// Events sent over the WebSocket gateway, always addressed to a single
/// connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Sent once the socket is accepted
    Ready { connection_id: ConnectionId },

    /// A message rendered in this connection's preferred language
    MessageDelivered(DeliveredMessage),

    /// The sender's message was persisted
    MessageAccepted {
        id: Uuid,
        channel_id: String,
        created_at: chrono::DateTime<chrono::Utc>,
    },

    /// The sender's message was not accepted
    MessageRejected { reason: String },

    /// A participant moved; identical for every connection in the channel
    LocationUpdated {
        user_id: String,
        user_name: Option<String>,
        location: Coordinates,
    },

    /// The sender's location update was not accepted
    LocationRejected { reason: String },
}

/// Commands sent FROM client TO server over WebSocket.
///
/// Fields are optional on the wire so incomplete payloads reach validation
/// and can be rejected with a reason instead of a parse failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Start receiving a channel's traffic on this connection
    JoinChannel {
        #[serde(default)]
        channel_id: Option<String>,
        #[serde(default)]
        user_id: Option<String>,
    },

    /// Stop receiving channel traffic without closing the socket
    LeaveChannel,

    /// Post a chat message in the sender's own language
    SendMessage {
        #[serde(default)]
        channel_id: Option<String>,
        #[serde(default)]
        sender_id: Option<String>,
        #[serde(default)]
        sender_display_name: Option<String>,
        #[serde(default)]
        text: Option<String>,
    },

    /// Publish the sender's latest position to the channel
    UpdateLocation {
        #[serde(default)]
        channel_id: Option<String>,
        #[serde(default)]
        user_id: Option<String>,
        #[serde(default)]
        user_name: Option<String>,
        #[serde(default)]
        location: Option<Coordinates>,
    },
}
