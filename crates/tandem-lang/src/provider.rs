use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("provider returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Malformed(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// One candidate label from a language identification model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LanguageScore {
    pub label: String,
    pub score: f64,
}

/// A hosted inference backend. Implementations make exactly one remote call
/// per method invocation and do not retry.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    async fn classify_language(
        &self,
        model: &str,
        text: &str,
    ) -> Result<Vec<LanguageScore>, ProviderError>;

    async fn translate(&self, model: &str, text: &str) -> Result<String, ProviderError>;
}
