//! Documents as returned by the search index.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A document hit read from the index.
///
/// Only `_id` and `_source` are kept; the pipeline reads one source field and
/// never rewrites the source itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_source", default)]
    pub source: Map<String, Value>,
}

impl IndexedDocument {
    pub fn new(id: impl Into<String>, source: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            source,
        }
    }

    /// Text of a source field, or `None` if missing or not a string.
    pub fn field_text(&self, field: &str) -> Option<&str> {
        self.source.get(field).and_then(Value::as_str)
    }
}

/// One page of a scroll traversal.
#[derive(Debug, Clone, Default)]
pub struct ScrollPage {
    /// Cursor token for the next fetch. May change on every page.
    pub scroll_id: Option<String>,
    /// Total number of documents the index reports for the query.
    pub total: u64,
    pub hits: Vec<IndexedDocument>,
}
