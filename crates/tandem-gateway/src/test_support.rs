use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

use tandem_db::Database;
use tandem_lang::{LanguageService, MockProvider};
use tandem_types::api::DeliveredMessage;
use tandem_types::events::GatewayEvent;
use tandem_types::models::{ConnectionId, Coordinates, Language, Message, NewMessage};
use tandem_types::store::{MessageStore, StoreError, StoreResult, UserProfileStore};

use crate::dispatcher::Dispatcher;
use crate::fanout::{FanoutConfig, FanoutEngine};
use crate::presence::{InMemoryPresence, PresenceRegistry};

pub struct Harness {
    pub db: Database,
    pub provider: Arc<MockProvider>,
    pub language: Arc<LanguageService>,
    pub presence: Arc<InMemoryPresence>,
    pub dispatcher: Dispatcher,
}

impl Harness {
    pub fn new(provider: MockProvider) -> Self {
        let provider = Arc::new(provider);
        Self {
            db: Database::open_in_memory().unwrap(),
            language: Arc::new(LanguageService::new(provider.clone(), Duration::from_millis(250))),
            provider,
            presence: Arc::new(InMemoryPresence::new()),
            dispatcher: Dispatcher::new(),
        }
    }

    pub fn user(&self, id: &str, language: &str) {
        self.db.upsert_user(id, id, language).unwrap();
    }

    /// Register a connection and join it to `channel`.
    pub async fn connect(
        &self,
        user_id: &str,
        channel: &str,
    ) -> (ConnectionId, UnboundedReceiver<GatewayEvent>) {
        let (conn, rx) = self.dispatcher.register_connection().await;
        self.presence.join(conn, user_id.into(), channel.into()).await;
        (conn, rx)
    }

    pub fn engine(&self) -> Arc<FanoutEngine> {
        self.engine_with(Arc::new(self.db.clone()), FanoutConfig::default())
    }

    pub fn engine_with(&self, messages: Arc<dyn MessageStore>, config: FanoutConfig) -> Arc<FanoutEngine> {
        Arc::new(FanoutEngine::new(
            self.language.clone(),
            messages,
            Arc::new(self.db.clone()),
            self.presence.clone(),
            self.dispatcher.clone(),
            config,
        ))
    }
}

pub fn drain(rx: &mut UnboundedReceiver<GatewayEvent>) -> Vec<GatewayEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn deliveries(rx: &mut UnboundedReceiver<GatewayEvent>) -> Vec<DeliveredMessage> {
    drain(rx)
        .into_iter()
        .filter_map(|event| match event {
            GatewayEvent::MessageDelivered(message) => Some(message),
            _ => None,
        })
        .collect()
}

/// A store whose backend is down.
pub struct UnavailableStore;

#[async_trait]
impl MessageStore for UnavailableStore {
    async fn append(&self, _message: NewMessage) -> StoreResult<Message> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn list_by_channel(&self, _channel_id: &str) -> StoreResult<Vec<Message>> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

#[async_trait]
impl UserProfileStore for UnavailableStore {
    async fn preferred_language(&self, _user_id: &str) -> StoreResult<Language> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn update_location(&self, _user_id: &str, _location: Coordinates) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}
