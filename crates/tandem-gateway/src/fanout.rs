//! Per-recipient translated delivery of chat messages.
//!
//! A message moves through `Received -> Detected -> Persisted -> Delivering`
//! and ends `Done` or `DeliveryPartiallyFailed`. Only validation and
//! persistence can fail the send; everything after persistence degrades per
//! recipient and is only logged.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use tandem_lang::LanguageService;
use tandem_types::api::DeliveredMessage;
use tandem_types::events::GatewayEvent;
use tandem_types::models::{ConnectionId, Language, LiveMember, Message, NewMessage};
use tandem_types::store::{MessageStore, StoreError, UserProfileStore};

use crate::dispatcher::Dispatcher;
use crate::ordering::{SendSequencer, SendTicket};
use crate::presence::PresenceRegistry;

pub const INCOMPLETE_MESSAGE: &str = "Incomplete message data.";
pub const SEND_FAILED: &str = "Server error: Could not send message.";

#[derive(Debug, Clone)]
pub struct FanoutConfig {
    /// Maximum recipients rendered concurrently for one message.
    pub width: usize,
    /// Budget for each preference lookup. An append that overruns it is only
    /// logged: the write cannot be cancelled, so its outcome is awaited.
    pub store_timeout: Duration,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            width: 8,
            store_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("incomplete message: missing {0}")]
    Incomplete(&'static str),

    #[error("persist failed: {0}")]
    Persistence(#[from] StoreError),
}

impl FanoutError {
    /// What the sender is told.
    pub fn reason(&self) -> &'static str {
        match self {
            FanoutError::Incomplete(_) => INCOMPLETE_MESSAGE,
            FanoutError::Persistence(_) => SEND_FAILED,
        }
    }
}

/// A `SendMessage` command as received; any field may be missing.
#[derive(Debug, Clone, Default)]
pub struct MessageDraft {
    pub channel_id: Option<String>,
    pub sender_id: Option<String>,
    pub sender_display_name: Option<String>,
    pub text: Option<String>,
}

/// A draft with every required field present and non-blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidMessage {
    pub channel_id: String,
    pub sender_id: String,
    pub sender_display_name: String,
    pub text: String,
}

fn required(field: Option<String>, name: &'static str) -> Result<String, FanoutError> {
    field
        .filter(|v| !v.trim().is_empty())
        .ok_or(FanoutError::Incomplete(name))
}

impl MessageDraft {
    pub fn validate(self) -> Result<ValidMessage, FanoutError> {
        Ok(ValidMessage {
            channel_id: required(self.channel_id, "channel_id")?,
            sender_id: required(self.sender_id, "sender_id")?,
            sender_display_name: required(self.sender_display_name, "sender_display_name")?,
            text: required(self.text, "text")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutState {
    Done,
    DeliveryPartiallyFailed,
}

/// Outcome of one successful send.
#[derive(Debug, Clone)]
pub struct FanoutReport {
    pub message: Message,
    /// Live connections resolved at delivery time.
    pub attempted: usize,
    /// Connections whose queue accepted the event.
    pub delivered: usize,
    /// Recipients who got a fallback text instead of their language.
    pub degraded: usize,
    /// The source-to-pivot hop failed and the original was stored as pivot.
    pub pivot_degraded: bool,
    pub state: FanoutState,
}

struct RecipientOutcome {
    delivered: bool,
    degraded: bool,
}

pub struct FanoutEngine {
    language: Arc<LanguageService>,
    messages: Arc<dyn MessageStore>,
    profiles: Arc<dyn UserProfileStore>,
    presence: Arc<dyn PresenceRegistry>,
    dispatcher: Dispatcher,
    sequencer: SendSequencer,
    config: FanoutConfig,
}

impl FanoutEngine {
    pub fn new(
        language: Arc<LanguageService>,
        messages: Arc<dyn MessageStore>,
        profiles: Arc<dyn UserProfileStore>,
        presence: Arc<dyn PresenceRegistry>,
        dispatcher: Dispatcher,
        config: FanoutConfig,
    ) -> Self {
        Self {
            language,
            messages,
            profiles,
            presence,
            dispatcher,
            sequencer: SendSequencer::new(),
            config,
        }
    }

    /// Validate now, run the rest on its own task.
    ///
    /// The ordering ticket is taken before spawning, so two messages submitted
    /// in sequence by one sender are persisted in that sequence. Returns `None`
    /// when the draft was rejected.
    pub fn submit(
        self: &Arc<Self>,
        origin: ConnectionId,
        draft: MessageDraft,
    ) -> Option<JoinHandle<Result<FanoutReport, FanoutError>>> {
        let valid = match draft.validate() {
            Ok(valid) => valid,
            Err(e) => {
                let engine = self.clone();
                tokio::spawn(async move { engine.reject(origin, &e).await });
                return None;
            }
        };

        let ticket = self.sequencer.ticket(&valid.channel_id, &valid.sender_id);
        let engine = self.clone();
        Some(tokio::spawn(async move { engine.process(origin, valid, ticket).await }))
    }

    /// Validate and run the whole pipeline on the current task.
    pub async fn send(
        &self,
        origin: ConnectionId,
        draft: MessageDraft,
    ) -> Result<FanoutReport, FanoutError> {
        let valid = match draft.validate() {
            Ok(valid) => valid,
            Err(e) => {
                self.reject(origin, &e).await;
                return Err(e);
            }
        };
        let ticket = self.sequencer.ticket(&valid.channel_id, &valid.sender_id);
        self.process(origin, valid, ticket).await
    }

    async fn reject(&self, origin: ConnectionId, err: &FanoutError) {
        warn!("Rejecting message from connection {}: {}", origin, err);
        self.dispatcher
            .send_to_connection(
                origin,
                GatewayEvent::MessageRejected {
                    reason: err.reason().to_string(),
                },
            )
            .await;
    }

    async fn process(
        &self,
        origin: ConnectionId,
        valid: ValidMessage,
        mut ticket: SendTicket,
    ) -> Result<FanoutReport, FanoutError> {
        ticket.wait_turn().await;

        let (message, pivot_degraded) = match self.persist(valid).await {
            Ok(persisted) => persisted,
            Err(e) => {
                error!("Message not persisted: {}", e);
                self.reject(origin, &e).await;
                return Err(e);
            }
        };
        drop(ticket);

        self.dispatcher
            .send_to_connection(
                origin,
                GatewayEvent::MessageAccepted {
                    id: message.id,
                    channel_id: message.channel_id.clone(),
                    created_at: message.created_at,
                },
            )
            .await;

        Ok(self.deliver(message, pivot_degraded).await)
    }

    /// Detected + Persisted. Also reports whether the pivot is a stand-in.
    async fn persist(&self, valid: ValidMessage) -> Result<(Message, bool), FanoutError> {
        let source = self.language.detect(&valid.text).await;
        let pivot = self
            .language
            .translate(&valid.text, source, Language::PIVOT)
            .await;

        // Without a first-hop model the original stands in for the pivot.
        let pivot_text = pivot.pivot_text.unwrap_or_else(|| valid.text.clone());

        let record = NewMessage {
            channel_id: valid.channel_id,
            sender_id: valid.sender_id,
            sender_display_name: valid.sender_display_name,
            original_text: valid.text,
            source_language: source,
            pivot_text,
        };

        // The ticket stays held until the store answers either way.
        let mut append = self.messages.append(record);
        let message = match tokio::time::timeout(self.config.store_timeout, &mut append).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    "Append still pending after {:?}, waiting for the store",
                    self.config.store_timeout
                );
                append.await?
            }
        };

        debug!(
            "Persisted message {} in {} (source {})",
            message.id, message.channel_id, message.source_language
        );
        Ok((message, pivot.degraded))
    }

    /// Delivering -> Done | DeliveryPartiallyFailed.
    async fn deliver(&self, message: Message, pivot_degraded: bool) -> FanoutReport {
        let members = self.presence.members_of(&message.channel_id).await;
        let attempted = members.len();

        let pending: Vec<_> = members
            .into_iter()
            .map(|member| self.deliver_to(&message, member))
            .collect();
        let outcomes: Vec<RecipientOutcome> = stream::iter(pending)
            .buffer_unordered(self.config.width.max(1))
            .collect()
            .await;

        let delivered = outcomes.iter().filter(|o| o.delivered).count();
        let degraded = outcomes.iter().filter(|o| o.degraded).count();
        if pivot_degraded {
            warn!(
                "Message {} stored with its original text as pivot",
                message.id
            );
        }
        let state = if degraded > 0 || pivot_degraded {
            warn!(
                "Message {} delivered with {} degraded recipient(s) of {}",
                message.id, degraded, attempted
            );
            FanoutState::DeliveryPartiallyFailed
        } else {
            FanoutState::Done
        };

        info!(
            "Message {} fanned out to {}/{} connection(s) in {}",
            message.id, delivered, attempted, message.channel_id
        );

        FanoutReport {
            message,
            attempted,
            delivered,
            degraded,
            pivot_degraded,
            state,
        }
    }

    async fn deliver_to(&self, message: &Message, member: LiveMember) -> RecipientOutcome {
        let (target, lookup_failed) = self.preferred_language(&member.user_id).await;
        let rendered = self.language.render(message, target).await;

        let event = GatewayEvent::MessageDelivered(DeliveredMessage::from_message(message, rendered.text));
        let delivered = self.dispatcher.send_to_connection(member.connection_id, event).await;
        if !delivered {
            debug!("Connection {} went away before delivery", member.connection_id);
        }

        RecipientOutcome {
            delivered,
            degraded: lookup_failed || rendered.degraded,
        }
    }

    /// Fresh read per recipient; a failed or slow lookup falls back to the pivot.
    async fn preferred_language(&self, user_id: &str) -> (Language, bool) {
        match tokio::time::timeout(self.config.store_timeout, self.profiles.preferred_language(user_id)).await {
            Ok(Ok(lang)) => (lang, false),
            Ok(Err(e)) => {
                warn!("Preference lookup for {} failed, using pivot: {}", user_id, e);
                (Language::PIVOT, true)
            }
            Err(_) => {
                warn!("Preference lookup for {} timed out, using pivot", user_id);
                (Language::PIVOT, true)
            }
        }
    }
}
