use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream;
use tracing::{debug, warn};

use tandem_lang::LanguageService;
use tandem_types::api::DeliveredMessage;
use tandem_types::models::Language;
use tandem_types::store::{MessageStore, StoreError, StoreResult, UserProfileStore};

/// Rebuilds a channel's history for one reader, translated at read time.
///
/// Nothing is cached: a reader who changes language sees the whole history in
/// the new language on the next call, and stored records are never touched.
pub struct HistoryService {
    language: Arc<LanguageService>,
    messages: Arc<dyn MessageStore>,
    profiles: Arc<dyn UserProfileStore>,
    width: usize,
    store_timeout: Duration,
}

impl HistoryService {
    pub fn new(
        language: Arc<LanguageService>,
        messages: Arc<dyn MessageStore>,
        profiles: Arc<dyn UserProfileStore>,
        width: usize,
        store_timeout: Duration,
    ) -> Self {
        Self {
            language,
            messages,
            profiles,
            width: width.max(1),
            store_timeout,
        }
    }

    /// All messages of `channel_id`, oldest first, each rendered for
    /// `requesting_user_id`'s current language. Fails only if the message log
    /// cannot be read.
    pub async fn get_history(
        &self,
        channel_id: &str,
        requesting_user_id: &str,
    ) -> StoreResult<Vec<DeliveredMessage>> {
        let target = match tokio::time::timeout(
            self.store_timeout,
            self.profiles.preferred_language(requesting_user_id),
        )
        .await
        {
            Ok(Ok(lang)) => lang,
            Ok(Err(e)) => {
                warn!("Preference lookup for {} failed, using pivot: {}", requesting_user_id, e);
                Language::PIVOT
            }
            Err(_) => {
                warn!("Preference lookup for {} timed out, using pivot", requesting_user_id);
                Language::PIVOT
            }
        };

        let messages = tokio::time::timeout(self.store_timeout, self.messages.list_by_channel(channel_id))
            .await
            .map_err(|_| StoreError::Unavailable("message listing timed out".into()))??;

        debug!(
            "Rendering {} message(s) of {} in {} for {}",
            messages.len(),
            channel_id,
            target,
            requesting_user_id
        );

        // `buffered` keeps input order while running up to `width` at once.
        let pending: Vec<_> = messages
            .iter()
            .map(|message| async move {
                let rendered = self.language.render(message, target).await;
                DeliveredMessage::from_message(message, rendered.text)
            })
            .collect();

        Ok(stream::iter(pending).buffered(self.width).collect().await)
    }
}

#[cfg(test)]
mod tests {
    use tandem_lang::{MockProvider, ModelCatalog};
    use tandem_types::models::NewMessage;
    use uuid::Uuid;

    use super::*;
    use crate::fanout::MessageDraft;
    use crate::test_support::{Harness, UnavailableStore};

    fn history(h: &Harness) -> HistoryService {
        HistoryService::new(
            h.language.clone(),
            Arc::new(h.db.clone()),
            Arc::new(h.db.clone()),
            4,
            Duration::from_secs(1),
        )
    }

    async fn post(h: &Harness, sender: &str, text: &str) {
        let draft = MessageDraft {
            channel_id: Some("ride-A".into()),
            sender_id: Some(sender.into()),
            sender_display_name: Some(sender.into()),
            text: Some(text.into()),
        };
        h.engine().send(Uuid::new_v4(), draft).await.unwrap();
    }

    fn provider() -> MockProvider {
        MockProvider::new()
            .with_detection("नमस्ते", &[("hi", 0.99)])
            .with_detection("¿Dónde estás?", &[("es", 0.97)])
            .with_translation(Language::Hi, Language::En, "नमस्ते", "Hello")
            .with_translation(Language::Es, Language::En, "¿Dónde estás?", "Where are you?")
            .with_translation(Language::En, Language::Es, "Hello", "Hola")
            .with_translation(Language::En, Language::Hi, "Where are you?", "तुम कहाँ हो?")
    }

    #[tokio::test]
    async fn history_is_ordered_and_rendered_for_the_reader() {
        let h = Harness::new(provider());
        h.user("ravi", "hi");
        post(&h, "ravi", "नमस्ते").await;
        post(&h, "sofia", "¿Dónde estás?").await;

        let got = history(&h).get_history("ride-A", "ravi").await.unwrap();
        let texts: Vec<_> = got.iter().map(|m| m.translated_message.as_str()).collect();
        assert_eq!(texts, vec!["नमस्ते", "तुम कहाँ हो?"]);
        assert_eq!(got[1].original_message, "¿Dónde estás?");
        assert_eq!(got[1].source_language, Language::Es);
    }

    #[tokio::test]
    async fn preference_change_changes_rendering_but_not_records() {
        let h = Harness::new(provider());
        h.user("ana", "en");
        post(&h, "ravi", "नमस्ते").await;
        let before = h.db.get_messages("ride-A").unwrap();

        let svc = history(&h);
        let first = svc.get_history("ride-A", "ana").await.unwrap();
        h.db.set_preferred_language("ana", "es").unwrap();
        let second = svc.get_history("ride-A", "ana").await.unwrap();

        assert_eq!(first[0].translated_message, "Hello");
        assert_eq!(second[0].translated_message, "Hola");
        assert_eq!(first[0].id, second[0].id);

        let after = h.db.get_messages("ride-A").unwrap();
        assert_eq!(before.len(), after.len());
        assert_eq!(before[0].pivot_text, after[0].pivot_text);
        assert_eq!(before[0].original_text, after[0].original_text);
    }

    #[tokio::test]
    async fn one_failed_translation_degrades_only_that_message() {
        let provider = provider()
            .with_detection("শুভ সকাল", &[("bn", 0.96)])
            .with_translation(Language::Bn, Language::En, "শুভ সকাল", "Good morning");
        let h = Harness::new(provider);
        h.user("bina", "bn");
        post(&h, "ravi", "नमस्ते").await;
        post(&h, "bina", "শুভ সকাল").await;

        // Break the reader's model only after the messages are stored.
        let mut catalog = ModelCatalog::default();
        catalog.remove(Language::En, Language::Bn);
        let language = Arc::new(
            LanguageService::new(h.provider.clone(), Duration::from_millis(250)).with_catalog(catalog),
        );
        let svc = HistoryService::new(
            language,
            Arc::new(h.db.clone()),
            Arc::new(h.db.clone()),
            4,
            Duration::from_secs(1),
        );

        let got = svc.get_history("ride-A", "bina").await.unwrap();
        let texts: Vec<_> = got.iter().map(|m| m.translated_message.as_str()).collect();
        assert_eq!(texts, vec!["Hello", "শুভ সকাল"]);
    }

    #[tokio::test]
    async fn unreadable_log_is_an_error() {
        let h = Harness::new(MockProvider::new());
        let svc = HistoryService::new(
            h.language.clone(),
            Arc::new(UnavailableStore),
            Arc::new(h.db.clone()),
            4,
            Duration::from_secs(1),
        );
        assert!(svc.get_history("ride-A", "ana").await.is_err());
    }

    #[tokio::test]
    async fn empty_channel_has_empty_history() {
        let h = Harness::new(MockProvider::new());
        assert!(history(&h).get_history("ride-Z", "ana").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_renders_with_bounded_concurrency() {
        let h = Harness::new(MockProvider::new().with_latency(Duration::from_millis(30)));
        h.user("sofia", "es");
        for i in 0..6 {
            h.db.append(NewMessage {
                channel_id: "ride-A".into(),
                sender_id: "ana".into(),
                sender_display_name: "Ana".into(),
                original_text: format!("Stop {}", i),
                source_language: Language::En,
                pivot_text: format!("Stop {}", i),
            })
            .await
            .unwrap();
        }
        let svc = HistoryService::new(
            h.language.clone(),
            Arc::new(h.db.clone()),
            Arc::new(h.db.clone()),
            2,
            Duration::from_secs(1),
        );

        let got = svc.get_history("ride-A", "sofia").await.unwrap();

        let texts: Vec<_> = got.iter().map(|m| m.translated_message.as_str()).collect();
        assert_eq!(
            texts,
            vec!["[es] Stop 0", "[es] Stop 1", "[es] Stop 2", "[es] Stop 3", "[es] Stop 4", "[es] Stop 5"]
        );
        let peak = h.provider.max_concurrent_translations();
        assert!((1..=2).contains(&peak), "peak concurrency was {}", peak);
    }
}
