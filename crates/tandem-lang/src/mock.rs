use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use tandem_types::models::Language;

use crate::catalog::ModelCatalog;
use crate::provider::{InferenceProvider, LanguageScore, ProviderError};

/// Scriptable in-process provider.
///
/// Unscripted translations echo the input tagged with the model's target
/// code, e.g. `"[es] Hello"`, so tests can tell which hop produced a string.
/// Unscripted detections report English.
#[derive(Default)]
pub struct MockProvider {
    detections: HashMap<String, Vec<LanguageScore>>,
    translations: HashMap<(String, String), String>,
    failing_models: HashSet<String>,
    latency: Option<Duration>,
    outage: AtomicBool,
    detect_calls: AtomicUsize,
    translate_calls: AtomicUsize,
    translations_in_flight: AtomicUsize,
    max_translations_in_flight: AtomicUsize,
    seen: Mutex<Vec<(String, String)>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_detection(mut self, text: &str, scores: &[(&str, f64)]) -> Self {
        let scores = scores
            .iter()
            .map(|(label, score)| LanguageScore {
                label: label.to_string(),
                score: *score,
            })
            .collect();
        self.detections.insert(text.to_string(), scores);
        self
    }

    pub fn with_translation(
        mut self,
        source: Language,
        target: Language,
        input: &str,
        output: &str,
    ) -> Self {
        let model = ModelCatalog::opus_model_name(source, target);
        self.translations
            .insert((model, input.to_string()), output.to_string());
        self
    }

    /// Every call to `model` fails with a 503.
    pub fn failing_model(mut self, model: &str) -> Self {
        self.failing_models.insert(model.to_string());
        self
    }

    /// Delay every call, e.g. to exercise timeouts.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Toggle a full outage: every call fails while set.
    pub fn set_outage(&self, down: bool) {
        self.outage.store(down, Ordering::SeqCst);
    }

    pub fn detect_calls(&self) -> usize {
        self.detect_calls.load(Ordering::SeqCst)
    }

    pub fn translate_calls(&self) -> usize {
        self.translate_calls.load(Ordering::SeqCst)
    }

    /// Highest number of translate calls that were running at once.
    pub fn max_concurrent_translations(&self) -> usize {
        self.max_translations_in_flight.load(Ordering::SeqCst)
    }

    /// `(model, input)` of every translate call, in call order.
    pub fn translate_log(&self) -> Vec<(String, String)> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }

    async fn simulate(&self, model: &str) -> Result<(), ProviderError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.outage.load(Ordering::SeqCst) || self.failing_models.contains(model) {
            return Err(ProviderError::Status {
                status: 503,
                message: format!("{} is currently unavailable", model),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl InferenceProvider for MockProvider {
    async fn classify_language(
        &self,
        model: &str,
        text: &str,
    ) -> Result<Vec<LanguageScore>, ProviderError> {
        self.detect_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate(model).await?;

        Ok(self.detections.get(text).cloned().unwrap_or_else(|| {
            vec![LanguageScore {
                label: Language::PIVOT.code().to_string(),
                score: 1.0,
            }]
        }))
    }

    async fn translate(&self, model: &str, text: &str) -> Result<String, ProviderError> {
        self.translate_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push((model.to_string(), text.to_string()));
        }
        let running = self.translations_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_translations_in_flight.fetch_max(running, Ordering::SeqCst);
        let outcome = self.simulate(model).await;
        self.translations_in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome?;

        if let Some(out) = self.translations.get(&(model.to_string(), text.to_string())) {
            return Ok(out.clone());
        }
        let target = model.rsplit('-').next().unwrap_or(model);
        Ok(format!("[{}] {}", target, text))
    }
}
