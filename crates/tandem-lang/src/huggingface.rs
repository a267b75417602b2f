use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::provider::{InferenceProvider, LanguageScore, ProviderError};

/// Connection settings for the Hugging Face Inference API.
#[derive(Debug, Clone)]
pub struct HuggingFaceConfig {
    pub base_url: String,
    /// Bearer token; requests go out unauthenticated when empty.
    pub token: String,
    /// Transport-level ceiling. The service applies its own, usually tighter,
    /// budget on top.
    pub request_timeout: Duration,
}

impl Default for HuggingFaceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api-inference.huggingface.co".to_string(),
            token: String::new(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
    options: InferenceOptions,
}

#[derive(Debug, Serialize)]
struct InferenceOptions {
    /// Block until a cold model is loaded instead of returning 503.
    wait_for_model: bool,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: String,
}

#[derive(Debug, Deserialize)]
struct TranslationOutput {
    translation_text: String,
}

/// Classification output comes back nested per input, but some deployments
/// return a flat list for a single input.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassificationOutput {
    Nested(Vec<Vec<LanguageScore>>),
    Flat(Vec<LanguageScore>),
}

pub struct HuggingFaceProvider {
    client: Client,
    config: HuggingFaceConfig,
}

impl HuggingFaceProvider {
    pub fn new(config: HuggingFaceConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ProviderError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn model_url(&self, model: &str) -> String {
        format!("{}/models/{}", self.config.base_url.trim_end_matches('/'), model)
    }

    async fn query<T>(&self, model: &str, text: &str) -> Result<T, ProviderError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let body = InferenceRequest {
            inputs: text,
            options: InferenceOptions { wait_for_model: true },
        };

        let mut request = self.client.post(self.model_url(model)).json(&body);
        if !self.config.token.is_empty() {
            request = request.bearer_auth(&self.config.token);
        }

        debug!("Querying model {} ({} chars)", model, text.chars().count());

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(self.config.request_timeout)
            } else {
                ProviderError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiError>(&raw)
                .map(|e| e.error)
                .unwrap_or(raw);
            warn!("HF API error from {}: {} {}", model, status.as_u16(), message);
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&raw).map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl InferenceProvider for HuggingFaceProvider {
    async fn classify_language(
        &self,
        model: &str,
        text: &str,
    ) -> Result<Vec<LanguageScore>, ProviderError> {
        let output: ClassificationOutput = self.query(model, text).await?;
        Ok(match output {
            ClassificationOutput::Nested(mut nested) => {
                if nested.is_empty() {
                    Vec::new()
                } else {
                    nested.swap_remove(0)
                }
            }
            ClassificationOutput::Flat(flat) => flat,
        })
    }

    async fn translate(&self, model: &str, text: &str) -> Result<String, ProviderError> {
        let output: Vec<TranslationOutput> = self.query(model, text).await?;
        output
            .into_iter()
            .next()
            .map(|o| o.translation_text)
            .ok_or_else(|| ProviderError::Malformed("empty translation list".into()))
    }
}
