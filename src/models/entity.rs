//! Recognizer output: tokens and entity spans for a single sentence.
//!
//! Offsets are character positions (not bytes) into the sentence text and
//! use half-open ranges: `start_pos` is inclusive, `end_pos` exclusive.

use serde::{Deserialize, Serialize};

/// A single token of a sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub start_pos: usize,
    pub end_pos: usize,
}

impl Token {
    pub fn new(text: impl Into<String>, start_pos: usize, end_pos: usize) -> Self {
        Self {
            text: text.into(),
            start_pos,
            end_pos,
        }
    }

    /// True if the token has no alphanumeric characters (".", ",", "--").
    pub fn is_punctuation(&self) -> bool {
        !self.text.is_empty() && !self.text.chars().any(char::is_alphanumeric)
    }
}

/// A category assigned to an entity span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub value: String,
    #[serde(default)]
    pub confidence: f32,
}

impl Label {
    pub fn new(value: impl Into<String>, confidence: f32) -> Self {
        Self {
            value: value.into(),
            confidence,
        }
    }
}

/// A recognized entity covering one or more consecutive tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySpan {
    pub text: String,
    pub start_pos: usize,
    pub end_pos: usize,
    #[serde(default)]
    pub labels: Vec<Label>,
}

impl EntitySpan {
    pub fn new(text: impl Into<String>, start_pos: usize, end_pos: usize, labels: Vec<Label>) -> Self {
        Self {
            text: text.into(),
            start_pos,
            end_pos,
            labels,
        }
    }

    /// The label shown in markup. `None` for spans without labels.
    pub fn primary_label(&self) -> Option<&str> {
        self.labels.first().map(|l| l.value.as_str())
    }

    /// Whether this span covers a token starting at `start`.
    pub fn covers(&self, start: usize) -> bool {
        self.start_pos <= start && start < self.end_pos
    }
}

/// Tokens and entities predicted for one sentence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(default)]
    pub tokens: Vec<Token>,
    #[serde(default)]
    pub entities: Vec<EntitySpan>,
}

impl Prediction {
    pub fn new(tokens: Vec<Token>, entities: Vec<EntitySpan>) -> Self {
        Self { tokens, entities }
    }

    /// Check the offset invariants the markup renderer relies on.
    ///
    /// `text_len` is the sentence length in characters. Returns a description
    /// of the first violation found.
    pub fn validate(&self, text_len: usize) -> Result<(), String> {
        let mut prev_end = 0usize;
        for (i, token) in self.tokens.iter().enumerate() {
            if token.start_pos > token.end_pos || token.end_pos > text_len {
                return Err(format!(
                    "token {} '{}' has invalid range {}..{} (sentence length {})",
                    i, token.text, token.start_pos, token.end_pos, text_len
                ));
            }
            if token.start_pos < prev_end {
                return Err(format!(
                    "token {} '{}' starts at {} before previous token end {}",
                    i, token.text, token.start_pos, prev_end
                ));
            }
            prev_end = token.end_pos;
        }

        let mut prev_end = 0usize;
        for (i, span) in self.entities.iter().enumerate() {
            if span.start_pos >= span.end_pos || span.end_pos > text_len {
                return Err(format!(
                    "entity {} '{}' has invalid range {}..{} (sentence length {})",
                    i, span.text, span.start_pos, span.end_pos, text_len
                ));
            }
            if span.start_pos < prev_end {
                return Err(format!(
                    "entity {} '{}' overlaps the previous entity",
                    i, span.text
                ));
            }
            if span.labels.is_empty() {
                return Err(format!("entity {} '{}' has no labels", i, span.text));
            }
            prev_end = span.end_pos;
        }

        Ok(())
    }
}
