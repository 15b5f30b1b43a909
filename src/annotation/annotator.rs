//! Per-document annotation: split, recognize, merge, aggregate.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use super::filters::{aggregate_filters, FilterCategoryMap, FilterValues};
use super::markup::render_markup;
use super::types::{AnnotatedSentence, DocumentError};
use crate::models::EntitySpan;
use crate::recognizer::{predict_checked, Recognizer, SentenceSplitter, UnicodeSentenceSplitter};

/// Name of the field holding the annotated copy of `source_field`.
pub fn annotated_field_name(source_field: &str) -> String {
    format!("{}_ner", source_field)
}

/// Annotation of one document, ready to be written back.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentAnnotation {
    /// Sentence markups joined by single spaces.
    pub markup: String,
    /// Sentences that produced at least one entity.
    pub sentences: Vec<AnnotatedSentence>,
    pub filters: FilterValues,
}

impl DocumentAnnotation {
    /// All entities of the document in order.
    pub fn entities(&self) -> impl Iterator<Item = &EntitySpan> {
        self.sentences.iter().flat_map(|s| s.entities.iter())
    }

    pub fn entity_count(&self) -> usize {
        self.sentences.iter().map(|s| s.entities.len()).sum()
    }

    /// Partial document for the update call: the annotated field plus every
    /// filter field, values sorted.
    pub fn to_update_doc(&self, annotated_field: &str) -> Value {
        let mut doc = Map::new();
        doc.insert(
            annotated_field.to_string(),
            Value::String(self.markup.clone()),
        );
        for (field, values) in &self.filters {
            let values = values.iter().cloned().map(Value::String).collect();
            doc.insert(field.clone(), Value::Array(values));
        }
        Value::Object(doc)
    }
}

/// Runs the recognizer over a document's text and builds its annotation.
pub struct DocumentAnnotator {
    recognizer: Arc<dyn Recognizer>,
    splitter: Arc<dyn SentenceSplitter>,
    categories: FilterCategoryMap,
}

impl DocumentAnnotator {
    pub fn new(recognizer: Arc<dyn Recognizer>, categories: FilterCategoryMap) -> Self {
        Self {
            recognizer,
            splitter: Arc::new(UnicodeSentenceSplitter::new()),
            categories,
        }
    }

    pub fn with_splitter(mut self, splitter: Arc<dyn SentenceSplitter>) -> Self {
        self.splitter = splitter;
        self
    }

    pub fn recognizer(&self) -> &dyn Recognizer {
        self.recognizer.as_ref()
    }

    pub fn categories(&self) -> &FilterCategoryMap {
        &self.categories
    }

    /// Annotate a document's text. The first recognizer failure fails the
    /// whole document so nothing partial gets written.
    pub async fn annotate_text(&self, text: &str) -> Result<DocumentAnnotation, DocumentError> {
        let sentences = self.splitter.split(text);
        let mut markups = Vec::with_capacity(sentences.len());
        let mut annotated = Vec::new();

        for (i, sentence) in sentences.into_iter().enumerate() {
            let prediction = predict_checked(self.recognizer.as_ref(), &sentence)
                .await
                .map_err(|source| DocumentError::Recognizer {
                    sentence: i,
                    source,
                })?;

            markups.push(render_markup(&prediction.tokens, &prediction.entities));
            if !prediction.entities.is_empty() {
                annotated.push(AnnotatedSentence {
                    text: sentence,
                    entities: prediction.entities,
                });
            }
        }

        let entities: Vec<EntitySpan> = annotated
            .iter()
            .flat_map(|s| s.entities.iter().cloned())
            .collect();
        let filters = aggregate_filters(&entities, &self.categories);
        debug!(
            "Annotated {} sentences, {} entities",
            markups.len(),
            entities.len()
        );

        Ok(DocumentAnnotation {
            markup: markups.join(" "),
            sentences: annotated,
            filters,
        })
    }
}
