use std::collections::HashMap;

use tandem_types::models::Language;

/// Language identification model; its labels are ISO 639-1 codes.
pub const DETECTION_MODEL: &str = "papluca/xlm-roberta-base-language-detection";

/// Which translation model serves each directed language pair.
///
/// Only pairs touching the pivot are expected. A missing pair is not an error
/// here; the service fails soft when it finds no model.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: HashMap<(Language, Language), String>,
}

impl ModelCatalog {
    pub fn empty() -> Self {
        Self { models: HashMap::new() }
    }

    pub fn opus_model_name(source: Language, target: Language) -> String {
        format!("Helsinki-NLP/opus-mt-{}-{}", source.code(), target.code())
    }

    pub fn insert(&mut self, source: Language, target: Language, model: impl Into<String>) {
        self.models.insert((source, target), model.into());
    }

    pub fn remove(&mut self, source: Language, target: Language) {
        self.models.remove(&(source, target));
    }

    pub fn model_for(&self, source: Language, target: Language) -> Option<&str> {
        self.models.get(&(source, target)).map(String::as_str)
    }
}

impl Default for ModelCatalog {
    /// Opus-MT models to and from the pivot for every supported language.
    fn default() -> Self {
        let mut catalog = Self::empty();
        for lang in Language::ALL.into_iter().filter(|l| !l.is_pivot()) {
            catalog.insert(lang, Language::PIVOT, Self::opus_model_name(lang, Language::PIVOT));
            catalog.insert(Language::PIVOT, lang, Self::opus_model_name(Language::PIVOT, lang));
        }
        catalog
    }
}
