//! Named-entity recognizers.
//!
//! A `Recognizer` turns one sentence into tokens and entity spans with
//! character offsets. Backends are picked by a configuration key (usually a
//! language name) through `RecognizerFactory`, once per run.

mod pattern;
mod remote;
mod splitter;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::models::Prediction;

pub use pattern::PatternRecognizer;
pub use remote::RemoteRecognizer;
pub use splitter::{SentenceSplitter, UnicodeSentenceSplitter};

/// Errors from a recognizer backend.
#[derive(Debug, Error)]
pub enum RecognizerError {
    #[error("Recognizer unavailable: {0}")]
    Unavailable(String),

    #[error("Recognizer connection error: {0}")]
    Connection(String),

    #[error("Recognizer returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse recognizer response: {0}")]
    Parse(String),

    #[error("Recognizer returned invalid offsets: {0}")]
    InvalidOffsets(String),
}

/// A named-entity recognizer for one model.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Identifier of the model behind this recognizer (e.g. "flair/ner").
    fn model_id(&self) -> &str;

    /// Whether the backend is ready to serve predictions.
    async fn is_available(&self) -> bool {
        true
    }

    /// Human-readable reason when `is_available` returns false.
    fn availability_hint(&self) -> String {
        String::new()
    }

    /// Tokenize and tag a single sentence.
    async fn predict(&self, sentence: &str) -> Result<Prediction, RecognizerError>;
}

/// Run `predict` and reject output that breaks the offset invariants.
pub async fn predict_checked(
    recognizer: &dyn Recognizer,
    sentence: &str,
) -> Result<Prediction, RecognizerError> {
    let prediction = recognizer.predict(sentence).await?;
    prediction
        .validate(sentence.chars().count())
        .map_err(RecognizerError::InvalidOffsets)?;
    Ok(prediction)
}

/// Recognizer backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// HTTP model server.
    Remote,
    /// Built-in rule-based recognizer.
    Pattern,
}

/// A model reachable under a configuration key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub backend: Backend,
    /// Model name sent to the model server. Ignored by the pattern backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ModelSpec {
    pub fn remote(model: &str) -> Self {
        Self {
            backend: Backend::Remote,
            model: Some(model.to_string()),
        }
    }

    pub fn pattern() -> Self {
        Self {
            backend: Backend::Pattern,
            model: None,
        }
    }
}

/// Configuration for recognizer backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizerConfig {
    /// Base URL of the model server.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Extra or replacement models by key. Merged over the built-in table.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub models: BTreeMap<String, ModelSpec>,
}

fn default_endpoint() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout() -> u64 {
    60
}

/// Built-in language to model table.
pub fn default_models() -> BTreeMap<String, ModelSpec> {
    let mut models = BTreeMap::new();
    models.insert("english".to_string(), ModelSpec::remote("flair/ner"));
    models.insert("dutch".to_string(), ModelSpec::remote("flair/ner-dutch"));
    models.insert("pattern".to_string(), ModelSpec::pattern());
    models
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self::base_default().with_env_overrides()
    }
}

impl RecognizerConfig {
    pub fn base_default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout(),
            models: BTreeMap::new(),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `NER_ENDPOINT`: model server base URL
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("NER_ENDPOINT") {
            self.endpoint = val;
        }
        self
    }

    /// Built-in models with configured entries applied on top.
    pub fn model_table(&self) -> BTreeMap<String, ModelSpec> {
        let mut models = default_models();
        models.extend(self.models.clone());
        models
    }
}

/// Resolves configuration keys to recognizer instances.
pub struct RecognizerFactory {
    config: RecognizerConfig,
    models: BTreeMap<String, ModelSpec>,
}

impl RecognizerFactory {
    pub fn new(config: RecognizerConfig) -> Self {
        let models = config.model_table();
        Self { config, models }
    }

    /// Configured keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        self.models.keys().map(String::as_str).collect()
    }

    pub fn models(&self) -> &BTreeMap<String, ModelSpec> {
        &self.models
    }

    /// Build the recognizer for `key`. Unknown keys are a configuration error.
    pub fn build(&self, key: &str) -> Result<Arc<dyn Recognizer>, ConfigError> {
        let spec = self
            .models
            .get(key)
            .ok_or_else(|| ConfigError::UnknownModel {
                key: key.to_string(),
                available: self.keys().join(", "),
            })?;

        match spec.backend {
            Backend::Pattern => Ok(Arc::new(PatternRecognizer::new())),
            Backend::Remote => {
                let model = spec.model.as_deref().ok_or_else(|| {
                    ConfigError::Invalid(format!("remote model '{}' has no model name", key))
                })?;
                let recognizer = RemoteRecognizer::new(
                    &self.config.endpoint,
                    model,
                    Duration::from_secs(self.config.timeout_secs),
                )
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
                Ok(Arc::new(recognizer))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntitySpan, Label, Token};

    struct Fixed(Prediction);

    #[async_trait]
    impl Recognizer for Fixed {
        fn model_id(&self) -> &str {
            "fixed"
        }

        async fn predict(&self, _sentence: &str) -> Result<Prediction, RecognizerError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_unknown_key_is_config_error() {
        let factory = RecognizerFactory::new(RecognizerConfig::base_default());
        match factory.build("klingon") {
            Err(ConfigError::UnknownModel { key, available }) => {
                assert_eq!(key, "klingon");
                assert_eq!(available, "dutch, english, pattern");
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[test]
    fn test_builds_default_models() {
        let factory = RecognizerFactory::new(RecognizerConfig::base_default());
        assert_eq!(factory.build("english").unwrap().model_id(), "flair/ner");
        assert_eq!(factory.build("dutch").unwrap().model_id(), "flair/ner-dutch");
        assert_eq!(factory.build("pattern").unwrap().model_id(), "pattern");
    }

    #[test]
    fn test_configured_models_override_defaults() {
        let mut config = RecognizerConfig::base_default();
        config
            .models
            .insert("english".to_string(), ModelSpec::remote("flair/ner-english-large"));
        config.models.insert("offline".to_string(), ModelSpec::pattern());

        let factory = RecognizerFactory::new(config);
        assert_eq!(
            factory.build("english").unwrap().model_id(),
            "flair/ner-english-large"
        );
        assert!(factory.build("offline").is_ok());
        assert_eq!(factory.keys().len(), 4);
    }

    #[test]
    fn test_remote_without_model_name_rejected() {
        let mut config = RecognizerConfig::base_default();
        config.models.insert(
            "broken".to_string(),
            ModelSpec {
                backend: Backend::Remote,
                model: None,
            },
        );
        let factory = RecognizerFactory::new(config);
        assert!(matches!(factory.build("broken"), Err(ConfigError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_predict_checked_rejects_out_of_range() {
        let recognizer = Fixed(Prediction::new(
            vec![Token::new("Hi", 0, 2)],
            vec![EntitySpan::new("Hi", 0, 9, vec![Label::new("PER", 1.0)])],
        ));
        let err = predict_checked(&recognizer, "Hi").await.unwrap_err();
        assert!(matches!(err, RecognizerError::InvalidOffsets(_)));
    }

    #[tokio::test]
    async fn test_predict_checked_counts_characters() {
        // 5 characters, 6 bytes
        let recognizer = Fixed(Prediction::new(
            vec![Token::new("Zoë", 0, 3), Token::new("ok", 3, 5)],
            vec![EntitySpan::new("Zoë", 0, 3, vec![Label::new("PER", 1.0)])],
        ));
        assert!(predict_checked(&recognizer, "Zoëok").await.is_ok());
    }
}
