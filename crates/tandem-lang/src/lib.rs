//! Language detection and translation for the Tandem relay.
//!
//! Translation always goes through the pivot language (English): a source
//! message is rendered once into the pivot, stored, and every reader's copy is
//! derived from that stored pivot text. This keeps the model matrix at `2N`
//! pairs instead of `N²`.
//!
//! - [`LanguageService`] wraps an [`InferenceProvider`] with timeouts and the
//!   fail-soft rules; callers never see provider errors.
//! - [`plan_delivery`] is the pure decision table used by live delivery and
//!   history reads.
//! - [`HuggingFaceProvider`] talks to the Hugging Face Inference API.
//! - `MockProvider` is a scriptable stand-in for tests, behind the
//!   `test-util` feature.

mod catalog;
mod huggingface;
#[cfg(any(test, feature = "test-util"))]
mod mock;
mod plan;
mod provider;
mod service;

pub use catalog::{DETECTION_MODEL, ModelCatalog};
pub use huggingface::{HuggingFaceConfig, HuggingFaceProvider};
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockProvider;
pub use plan::{DeliveryPlan, plan_delivery};
pub use provider::{InferenceProvider, LanguageScore, ProviderError};
pub use service::{LanguageService, Rendered, Translation};
