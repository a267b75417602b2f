use std::sync::Arc;

use tracing::{debug, info, warn};

use tandem_types::events::GatewayCommand;
use tandem_types::models::ConnectionId;

use crate::dispatcher::Dispatcher;
use crate::fanout::{FanoutEngine, MessageDraft};
use crate::location::{LocationBroadcaster, LocationDraft};
use crate::presence::PresenceRegistry;

/// Everything a gateway connection needs, cheap to clone into each socket task.
#[derive(Clone)]
pub struct Relay {
    pub dispatcher: Dispatcher,
    pub presence: Arc<dyn PresenceRegistry>,
    pub fanout: Arc<FanoutEngine>,
    pub location: Arc<LocationBroadcaster>,
}

impl Relay {
    pub fn new(
        dispatcher: Dispatcher,
        presence: Arc<dyn PresenceRegistry>,
        fanout: Arc<FanoutEngine>,
        location: Arc<LocationBroadcaster>,
    ) -> Self {
        Self {
            dispatcher,
            presence,
            fanout,
            location,
        }
    }

    /// Apply one client command. Sends and location updates run on their own
    /// tasks so a slow translation never stalls the socket reader.
    pub async fn handle_command(&self, conn_id: ConnectionId, cmd: GatewayCommand) {
        match cmd {
            GatewayCommand::JoinChannel { channel_id, user_id } => {
                let channel_id = channel_id.filter(|v| !v.trim().is_empty());
                let user_id = user_id.filter(|v| !v.trim().is_empty());
                match (channel_id, user_id) {
                    (Some(channel_id), Some(user_id)) => {
                        info!("{} joined {} on connection {}", user_id, channel_id, conn_id);
                        self.presence.join(conn_id, user_id, channel_id).await;
                    }
                    _ => warn!("Connection {} sent JoinChannel without channel or user", conn_id),
                }
            }

            GatewayCommand::LeaveChannel => {
                if let Some(entry) = self.presence.leave(conn_id).await {
                    info!("{} left {} on connection {}", entry.user_id, entry.channel_id, conn_id);
                }
            }

            GatewayCommand::SendMessage {
                channel_id,
                sender_id,
                sender_display_name,
                text,
            } => {
                let draft = MessageDraft {
                    channel_id,
                    sender_id,
                    sender_display_name,
                    text,
                };
                if self.fanout.submit(conn_id, draft).is_none() {
                    debug!("Message from connection {} rejected at validation", conn_id);
                }
            }

            GatewayCommand::UpdateLocation {
                channel_id,
                user_id,
                user_name,
                location,
            } => {
                let draft = LocationDraft {
                    channel_id,
                    user_id,
                    user_name,
                    location,
                };
                let broadcaster = self.location.clone();
                tokio::spawn(async move {
                    // Failures are already reported to the sender.
                    let _ = broadcaster.update_location(conn_id, draft).await;
                });
            }
        }
    }

    /// Drop every trace of a closed connection.
    pub async fn disconnect(&self, conn_id: ConnectionId) {
        if let Some(entry) = self.presence.leave(conn_id).await {
            debug!("Removed {} from {} on disconnect", entry.user_id, entry.channel_id);
        }
        self.dispatcher.unregister_connection(conn_id).await;
    }
}
