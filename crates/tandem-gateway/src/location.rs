use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, warn};

use tandem_types::events::GatewayEvent;
use tandem_types::models::{ConnectionId, Coordinates};
use tandem_types::store::{StoreError, UserProfileStore};

use crate::dispatcher::Dispatcher;
use crate::presence::PresenceRegistry;

pub const INCOMPLETE_LOCATION: &str = "Incomplete location data.";
pub const LOCATION_FAILED: &str = "Server error updating location.";

#[derive(Debug, Error)]
pub enum LocationError {
    #[error("incomplete location update: missing {0}")]
    Incomplete(&'static str),

    #[error("location not stored: {0}")]
    Persistence(#[from] StoreError),
}

impl LocationError {
    pub fn reason(&self) -> &'static str {
        match self {
            LocationError::Incomplete(_) => INCOMPLETE_LOCATION,
            LocationError::Persistence(_) => LOCATION_FAILED,
        }
    }
}

/// An `UpdateLocation` command as received.
#[derive(Debug, Clone, Default)]
pub struct LocationDraft {
    pub channel_id: Option<String>,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub location: Option<Coordinates>,
}

/// Relays position updates verbatim to everyone live in a channel, sender
/// included. Only the latest position per user is kept.
pub struct LocationBroadcaster {
    profiles: Arc<dyn UserProfileStore>,
    presence: Arc<dyn PresenceRegistry>,
    dispatcher: Dispatcher,
    store_timeout: Duration,
}

impl LocationBroadcaster {
    pub fn new(
        profiles: Arc<dyn UserProfileStore>,
        presence: Arc<dyn PresenceRegistry>,
        dispatcher: Dispatcher,
        store_timeout: Duration,
    ) -> Self {
        Self {
            profiles,
            presence,
            dispatcher,
            store_timeout,
        }
    }

    /// Returns how many connections were sent the update.
    pub async fn update_location(
        &self,
        origin: ConnectionId,
        draft: LocationDraft,
    ) -> Result<usize, LocationError> {
        match self.store_and_broadcast(draft).await {
            Ok(count) => Ok(count),
            Err(e) => {
                match &e {
                    LocationError::Incomplete(_) => warn!("Rejecting location from {}: {}", origin, e),
                    LocationError::Persistence(_) => error!("Location update from {} failed: {}", origin, e),
                }
                self.dispatcher
                    .send_to_connection(
                        origin,
                        GatewayEvent::LocationRejected {
                            reason: e.reason().to_string(),
                        },
                    )
                    .await;
                Err(e)
            }
        }
    }

    async fn store_and_broadcast(&self, draft: LocationDraft) -> Result<usize, LocationError> {
        let channel_id = draft
            .channel_id
            .filter(|v| !v.trim().is_empty())
            .ok_or(LocationError::Incomplete("channel_id"))?;
        let user_id = draft
            .user_id
            .filter(|v| !v.trim().is_empty())
            .ok_or(LocationError::Incomplete("user_id"))?;
        let location = draft
            .location
            .filter(|c| c.lat.is_finite() && c.lng.is_finite())
            .ok_or(LocationError::Incomplete("location"))?;

        tokio::time::timeout(self.store_timeout, self.profiles.update_location(&user_id, location))
            .await
            .map_err(|_| StoreError::Unavailable("location update timed out".into()))??;

        let targets: Vec<ConnectionId> = self
            .presence
            .members_of(&channel_id)
            .await
            .into_iter()
            .map(|m| m.connection_id)
            .collect();

        let event = GatewayEvent::LocationUpdated {
            user_id,
            user_name: draft.user_name,
            location,
        };
        let sent = self.dispatcher.send_to_many(&targets, &event).await;
        debug!("Location update relayed to {}/{} connection(s) in {}", sent, targets.len(), channel_id);
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use tandem_lang::MockProvider;

    use super::*;
    use crate::test_support::{Harness, UnavailableStore, drain};

    fn broadcaster(h: &Harness) -> LocationBroadcaster {
        LocationBroadcaster::new(
            Arc::new(h.db.clone()),
            h.presence.clone(),
            h.dispatcher.clone(),
            Duration::from_secs(1),
        )
    }

    fn draft(user: &str, lat: f64, lng: f64) -> LocationDraft {
        LocationDraft {
            channel_id: Some("ride-A".into()),
            user_id: Some(user.into()),
            user_name: Some("Asha".into()),
            location: Some(Coordinates { lat, lng }),
        }
    }

    #[tokio::test]
    async fn update_is_stored_and_sent_identically_to_everyone() {
        let h = Harness::new(MockProvider::new());
        h.user("asha", "hi");
        h.user("ben", "es");
        let (asha_conn, mut asha_rx) = h.connect("asha", "ride-A").await;
        let (_, mut ben_rx) = h.connect("ben", "ride-A").await;
        let (_, mut other_rx) = h.connect("carl", "ride-B").await;

        let sent = broadcaster(&h)
            .update_location(asha_conn, draft("asha", 20.29, 85.82))
            .await
            .unwrap();
        assert_eq!(sent, 2);

        for rx in [&mut asha_rx, &mut ben_rx] {
            match drain(rx).as_slice() {
                [GatewayEvent::LocationUpdated { user_id, user_name, location }] => {
                    assert_eq!(user_id, "asha");
                    assert_eq!(user_name.as_deref(), Some("Asha"));
                    assert_eq!(*location, Coordinates { lat: 20.29, lng: 85.82 });
                }
                other => panic!("unexpected events: {:?}", other),
            }
        }
        assert!(drain(&mut other_rx).is_empty());

        let user = h.db.get_user_by_id("asha").unwrap().unwrap();
        assert_eq!((user.location_lat, user.location_lng), (Some(20.29), Some(85.82)));
    }

    #[tokio::test]
    async fn latest_position_wins() {
        let h = Harness::new(MockProvider::new());
        h.user("asha", "en");
        let (conn, _rx) = h.connect("asha", "ride-A").await;
        let svc = broadcaster(&h);

        svc.update_location(conn, draft("asha", 1.0, 1.0)).await.unwrap();
        svc.update_location(conn, draft("asha", 2.0, 3.0)).await.unwrap();

        let user = h.db.get_user_by_id("asha").unwrap().unwrap();
        assert_eq!((user.location_lat, user.location_lng), (Some(2.0), Some(3.0)));
    }

    #[tokio::test]
    async fn missing_fields_are_rejected_to_sender_only() {
        let h = Harness::new(MockProvider::new());
        h.user("asha", "en");
        let (asha_conn, mut asha_rx) = h.connect("asha", "ride-A").await;
        let (_, mut ben_rx) = h.connect("ben", "ride-A").await;

        let mut incomplete = draft("asha", 1.0, 1.0);
        incomplete.location = None;
        let err = broadcaster(&h).update_location(asha_conn, incomplete).await.unwrap_err();

        assert!(matches!(err, LocationError::Incomplete("location")));
        assert!(matches!(
            drain(&mut asha_rx).as_slice(),
            [GatewayEvent::LocationRejected { reason }] if reason == INCOMPLETE_LOCATION
        ));
        assert!(drain(&mut ben_rx).is_empty());
    }

    #[tokio::test]
    async fn unknown_user_is_still_broadcast() {
        let h = Harness::new(MockProvider::new());
        let (conn, mut rx) = h.connect("ghost", "ride-A").await;
        let (_, mut ben_rx) = h.connect("ben", "ride-A").await;

        let sent = broadcaster(&h)
            .update_location(conn, draft("ghost", 1.0, 1.0))
            .await
            .unwrap();

        assert_eq!(sent, 2);
        assert!(matches!(drain(&mut rx).as_slice(), [GatewayEvent::LocationUpdated { .. }]));
        assert!(matches!(drain(&mut ben_rx).as_slice(), [GatewayEvent::LocationUpdated { .. }]));
        assert!(h.db.get_user_by_id("ghost").unwrap().is_none());
    }

    #[tokio::test]
    async fn store_outage_is_a_persistence_rejection() {
        let h = Harness::new(MockProvider::new());
        let (conn, mut rx) = h.connect("asha", "ride-A").await;
        let (_, mut ben_rx) = h.connect("ben", "ride-A").await;
        let svc = LocationBroadcaster::new(
            Arc::new(UnavailableStore),
            h.presence.clone(),
            h.dispatcher.clone(),
            Duration::from_secs(1),
        );

        let err = svc.update_location(conn, draft("asha", 1.0, 1.0)).await.unwrap_err();

        assert!(matches!(err, LocationError::Persistence(_)));
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [GatewayEvent::LocationRejected { reason }] if reason == LOCATION_FAILED
        ));
        assert!(drain(&mut ben_rx).is_empty());
    }
}
