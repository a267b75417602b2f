use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use tandem_types::models::{Language, Message};

use crate::catalog::{DETECTION_MODEL, ModelCatalog};
use crate::plan::{DeliveryPlan, plan_delivery};
use crate::provider::{InferenceProvider, ProviderError};

/// Result of [`LanguageService::translate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    /// The pivot rendering, when one was known or produced. Unset when source
    /// and target match and the source is not the pivot, or when the first hop
    /// could not run.
    pub pivot_text: Option<String>,
    pub translated_text: String,
    /// True when some hop failed and an earlier text was substituted.
    pub degraded: bool,
}

/// A stored message as rendered for one reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    pub degraded: bool,
}

/// Detection and pivot translation with bounded, fail-soft provider calls.
pub struct LanguageService {
    provider: Arc<dyn InferenceProvider>,
    catalog: ModelCatalog,
    timeout: Duration,
}

impl LanguageService {
    pub fn new(provider: Arc<dyn InferenceProvider>, timeout: Duration) -> Self {
        Self {
            provider,
            catalog: ModelCatalog::default(),
            timeout,
        }
    }

    pub fn with_catalog(mut self, catalog: ModelCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Detect the language of `text`. Errors, timeouts and unsupported labels
    /// all yield [`Language::FALLBACK`].
    pub async fn detect(&self, text: &str) -> Language {
        let call = self.provider.classify_language(DETECTION_MODEL, text);
        let scores = match self.bounded(call).await {
            Ok(scores) => scores,
            Err(e) => {
                warn!("Language detection failed, assuming {}: {}", Language::FALLBACK, e);
                return Language::FALLBACK;
            }
        };

        let best = scores
            .iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .map(|s| s.label.as_str());

        match best.map(str::parse::<Language>) {
            Some(Ok(lang)) => lang,
            Some(Err(e)) => {
                debug!("Detected {}, using {}", e, Language::FALLBACK);
                Language::FALLBACK
            }
            None => {
                warn!("Language detection returned no labels, assuming {}", Language::FALLBACK);
                Language::FALLBACK
            }
        }
    }

    /// Translate `text` from `source` to `target` through the pivot.
    ///
    /// Never fails: a missing model or provider error on the first hop returns
    /// the original text, on the second hop the pivot text.
    pub async fn translate(&self, text: &str, source: Language, target: Language) -> Translation {
        if source == target {
            return Translation {
                pivot_text: source.is_pivot().then(|| text.to_string()),
                translated_text: text.to_string(),
                degraded: false,
            };
        }

        let pivot_text = if source.is_pivot() {
            text.to_string()
        } else {
            match self.run_model(source, Language::PIVOT, text).await {
                Ok(pivot) => pivot,
                Err(e) => {
                    warn!("{}->{} failed, returning original text: {}", source, Language::PIVOT, e);
                    return Translation {
                        pivot_text: None,
                        translated_text: text.to_string(),
                        degraded: true,
                    };
                }
            }
        };

        if target.is_pivot() {
            return Translation {
                translated_text: pivot_text.clone(),
                pivot_text: Some(pivot_text),
                degraded: false,
            };
        }

        match self.run_model(Language::PIVOT, target, &pivot_text).await {
            Ok(translated) => Translation {
                pivot_text: Some(pivot_text),
                translated_text: translated,
                degraded: false,
            },
            Err(e) => {
                warn!("{}->{} failed, returning pivot text: {}", Language::PIVOT, target, e);
                Translation {
                    translated_text: pivot_text.clone(),
                    pivot_text: Some(pivot_text),
                    degraded: true,
                }
            }
        }
    }

    /// Render a stored message for a reader of `target`.
    pub async fn render(&self, message: &Message, target: Language) -> Rendered {
        let plan = plan_delivery(message.source_language, target);
        if let Some(text) = plan.immediate_text(&message.original_text, &message.pivot_text) {
            return Rendered {
                text: text.to_string(),
                degraded: false,
            };
        }

        debug_assert_eq!(plan, DeliveryPlan::FromPivot(target));
        let translation = self
            .translate(&message.pivot_text, Language::PIVOT, target)
            .await;
        Rendered {
            text: translation.translated_text,
            degraded: translation.degraded,
        }
    }

    async fn run_model(
        &self,
        source: Language,
        target: Language,
        text: &str,
    ) -> Result<String, ProviderError> {
        let model = self.catalog.model_for(source, target).ok_or_else(|| {
            ProviderError::Malformed(format!("no model for {}-{}", source, target))
        })?;

        let translated = self.bounded(self.provider.translate(model, text)).await?;
        if translated.trim().is_empty() {
            return Err(ProviderError::Malformed(format!("{} returned empty text", model)));
        }
        Ok(translated)
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, ProviderError>
    where
        F: std::future::Future<Output = Result<T, ProviderError>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout))?
    }
}
