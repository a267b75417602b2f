use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::trace;
use uuid::Uuid;

use tandem_types::events::GatewayEvent;
use tandem_types::models::ConnectionId;

/// Owns the outbound queue of every live connection.
///
/// The dispatcher only moves payloads; it has no idea which channel a
/// connection is in. Targets come from the presence registry.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// Per-connection targeted send channels
    connections: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<GatewayEvent>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection. Returns (conn_id, receiver).
    pub async fn register_connection(&self) -> (ConnectionId, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.connections.write().await.insert(conn_id, tx);
        (conn_id, rx)
    }

    pub async fn unregister_connection(&self, conn_id: ConnectionId) {
        self.inner.connections.write().await.remove(&conn_id);
    }

    /// Queue an event for one connection. Returns false if the connection is
    /// gone or its receiver was dropped.
    pub async fn send_to_connection(&self, conn_id: ConnectionId, event: GatewayEvent) -> bool {
        let connections = self.inner.connections.read().await;
        match connections.get(&conn_id) {
            Some(tx) => tx.send(event).is_ok(),
            None => {
                trace!("Dropping event for unknown connection {}", conn_id);
                false
            }
        }
    }

    /// Queue the same event for several connections. Returns how many
    /// accepted it.
    pub async fn send_to_many(&self, conn_ids: &[ConnectionId], event: &GatewayEvent) -> usize {
        let connections = self.inner.connections.read().await;
        conn_ids
            .iter()
            .filter_map(|id| connections.get(id))
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count()
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }
}
