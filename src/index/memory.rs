//! In-memory index backend.
//!
//! Holds documents and mappings in process. Scroll cursors, partial updates
//! and mapping declarations follow the semantics of the HTTP backend closely
//! enough to drive the full pipeline without a server.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::error::IndexError;
use super::{FieldMappings, IndexClient, ScrollRequest};
use crate::models::{IndexedDocument, ScrollPage};

/// Number of calls made per operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexCallCounts {
    pub open_scroll: usize,
    pub next_scroll: usize,
    pub clear_scroll: usize,
    pub update: usize,
    pub put_mapping: usize,
}

impl IndexCallCounts {
    /// Initial plus follow-up page fetches.
    pub fn fetches(&self) -> usize {
        self.open_scroll + self.next_scroll
    }
}

#[derive(Debug)]
struct Cursor {
    index: String,
    offset: usize,
    page_size: usize,
    pages_served: usize,
}

#[derive(Debug, Default)]
struct State {
    documents: BTreeMap<String, Vec<IndexedDocument>>,
    mappings: BTreeMap<String, FieldMappings>,
    cursors: HashMap<String, Cursor>,
    next_cursor: u64,
    calls: IndexCallCounts,
    failing_updates: HashSet<String>,
    failing_continuation: bool,
    /// Cursors stop returning hits after this many pages.
    expire_after_pages: Option<usize>,
}

/// In-memory `IndexClient`.
#[derive(Debug, Default)]
pub struct MemoryIndexClient {
    state: Mutex<State>,
}

impl MemoryIndexClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty index.
    pub async fn create_index(&self, index: &str) {
        let mut state = self.state.lock().await;
        state.documents.entry(index.to_string()).or_default();
    }

    /// Add a document with the given source to an index.
    pub async fn insert(&self, index: &str, doc: IndexedDocument) {
        let mut state = self.state.lock().await;
        state.documents.entry(index.to_string()).or_default().push(doc);
    }

    /// Add a document whose source has a single text field.
    pub async fn insert_text(&self, index: &str, id: &str, field: &str, text: &str) {
        let mut source = serde_json::Map::new();
        source.insert(field.to_string(), Value::String(text.to_string()));
        self.insert(index, IndexedDocument::new(id, source)).await;
    }

    /// Declare a field mapping directly, bypassing conflict checks.
    pub async fn set_mapping(&self, index: &str, field: &str, field_type: &str) {
        let mut state = self.state.lock().await;
        state
            .mappings
            .entry(index.to_string())
            .or_default()
            .insert(field.to_string(), field_type.to_string());
    }

    /// Make updates for the given document id fail with a server error.
    pub async fn fail_updates_for(&self, id: &str) {
        self.state.lock().await.failing_updates.insert(id.to_string());
    }

    /// Make every follow-up page fetch fail with a server error.
    pub async fn fail_scroll_continuation(&self) {
        self.state.lock().await.failing_continuation = true;
    }

    /// Simulate a cursor that expires after `pages` pages.
    pub async fn expire_cursors_after(&self, pages: usize) {
        self.state.lock().await.expire_after_pages = Some(pages);
    }

    pub async fn document(&self, index: &str, id: &str) -> Option<IndexedDocument> {
        let state = self.state.lock().await;
        state
            .documents
            .get(index)
            .and_then(|docs| docs.iter().find(|d| d.id == id))
            .cloned()
    }

    pub async fn mapping(&self, index: &str) -> FieldMappings {
        let state = self.state.lock().await;
        state.mappings.get(index).cloned().unwrap_or_default()
    }

    pub async fn calls(&self) -> IndexCallCounts {
        self.state.lock().await.calls.clone()
    }

    /// Cursors opened and not yet released.
    pub async fn open_cursors(&self) -> usize {
        self.state.lock().await.cursors.len()
    }
}

fn missing_index(index: &str) -> IndexError {
    IndexError::Status {
        operation: "search".to_string(),
        status: 404,
        body: format!("no such index [{}]", index),
    }
}

impl State {
    fn serve_page(&mut self, scroll_id: &str) -> Result<ScrollPage, IndexError> {
        let expire_after = self.expire_after_pages;
        let cursor = self
            .cursors
            .get_mut(scroll_id)
            .ok_or_else(|| IndexError::UnknownCursor(scroll_id.to_string()))?;
        let docs = self
            .documents
            .get(&cursor.index)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let expired = expire_after.is_some_and(|limit| cursor.pages_served >= limit);
        let hits: Vec<IndexedDocument> = if expired {
            Vec::new()
        } else {
            docs.iter()
                .skip(cursor.offset)
                .take(cursor.page_size)
                .cloned()
                .collect()
        };

        cursor.offset += hits.len();
        cursor.pages_served += 1;

        Ok(ScrollPage {
            scroll_id: Some(scroll_id.to_string()),
            total: docs.len() as u64,
            hits,
        })
    }
}

#[async_trait]
impl IndexClient for MemoryIndexClient {
    async fn ping(&self) -> Result<(), IndexError> {
        Ok(())
    }

    async fn open_scroll(
        &self,
        index: &str,
        request: &ScrollRequest,
    ) -> Result<ScrollPage, IndexError> {
        let mut state = self.state.lock().await;
        state.calls.open_scroll += 1;
        if !state.documents.contains_key(index) {
            return Err(missing_index(index));
        }

        state.next_cursor += 1;
        let scroll_id = format!("cursor-{}", state.next_cursor);
        state.cursors.insert(
            scroll_id.clone(),
            Cursor {
                index: index.to_string(),
                offset: 0,
                page_size: request.page_size.max(1),
                pages_served: 0,
            },
        );
        state.serve_page(&scroll_id)
    }

    async fn next_scroll(
        &self,
        scroll_id: &str,
        _lease: Duration,
    ) -> Result<ScrollPage, IndexError> {
        let mut state = self.state.lock().await;
        state.calls.next_scroll += 1;
        if state.failing_continuation {
            return Err(IndexError::Status {
                operation: "scroll".to_string(),
                status: 500,
                body: "simulated failure".to_string(),
            });
        }
        state.serve_page(scroll_id)
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), IndexError> {
        let mut state = self.state.lock().await;
        state.calls.clear_scroll += 1;
        state.cursors.remove(scroll_id);
        Ok(())
    }

    async fn update_document(
        &self,
        index: &str,
        id: &str,
        doc: &Value,
    ) -> Result<(), IndexError> {
        let mut state = self.state.lock().await;
        state.calls.update += 1;
        if state.failing_updates.contains(id) {
            return Err(IndexError::Status {
                operation: "update".to_string(),
                status: 500,
                body: "simulated failure".to_string(),
            });
        }

        let fields = doc
            .as_object()
            .ok_or_else(|| IndexError::parse("update", "partial document must be an object"))?;
        let stored = state
            .documents
            .get_mut(index)
            .and_then(|docs| docs.iter_mut().find(|d| d.id == id))
            .ok_or_else(|| IndexError::Status {
                operation: "update".to_string(),
                status: 404,
                body: format!("document {} not found", id),
            })?;

        for (key, value) in fields {
            stored.source.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn get_mapping(&self, index: &str) -> Result<FieldMappings, IndexError> {
        let state = self.state.lock().await;
        if !state.documents.contains_key(index) && !state.mappings.contains_key(index) {
            return Err(missing_index(index));
        }
        Ok(state.mappings.get(index).cloned().unwrap_or_default())
    }

    async fn put_mapping(&self, index: &str, fields: &FieldMappings) -> Result<(), IndexError> {
        let mut state = self.state.lock().await;
        state.calls.put_mapping += 1;
        let existing = state.mappings.entry(index.to_string()).or_default();

        for (name, field_type) in fields {
            if let Some(current) = existing.get(name) {
                if current != field_type {
                    return Err(IndexError::Status {
                        operation: "put_mapping".to_string(),
                        status: 400,
                        body: format!(
                            "mapper [{}] cannot be changed from type [{}] to [{}]",
                            name, current, field_type
                        ),
                    });
                }
            }
        }
        for (name, field_type) in fields {
            existing.insert(name.clone(), field_type.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_scroll_pages_through_everything() {
        let index = MemoryIndexClient::new();
        for i in 0..5 {
            index.insert_text("letters", &i.to_string(), "text", "x").await;
        }
        let request = ScrollRequest::new(2, Duration::from_secs(60));

        let first = index.open_scroll("letters", &request).await.unwrap();
        assert_eq!(first.total, 5);
        assert_eq!(first.hits.len(), 2);

        let id = first.scroll_id.unwrap();
        let second = index.next_scroll(&id, request.lease).await.unwrap();
        let third = index.next_scroll(&id, request.lease).await.unwrap();
        let fourth = index.next_scroll(&id, request.lease).await.unwrap();
        assert_eq!(second.hits.len(), 2);
        assert_eq!(third.hits.len(), 1);
        assert!(fourth.hits.is_empty());

        index.clear_scroll(&id).await.unwrap();
        assert_eq!(index.open_cursors().await, 0);
        assert!(index.next_scroll(&id, request.lease).await.is_err());
    }

    #[tokio::test]
    async fn test_partial_update_keeps_source() {
        let index = MemoryIndexClient::new();
        index.insert_text("letters", "1", "text", "Mortimer is from London.").await;
        index
            .update_document("letters", "1", &json!({"text_ner": "[Mortimer](PER)"}))
            .await
            .unwrap();

        let doc = index.document("letters", "1").await.unwrap();
        assert_eq!(doc.field_text("text"), Some("Mortimer is from London."));
        assert_eq!(doc.field_text("text_ner"), Some("[Mortimer](PER)"));
    }

    #[tokio::test]
    async fn test_conflicting_mapping_rejected() {
        let index = MemoryIndexClient::new();
        index.set_mapping("letters", "text_ner", "keyword").await;

        let mut fields = FieldMappings::new();
        fields.insert("text_ner".to_string(), "annotated_text".to_string());
        let err = index.put_mapping("letters", &fields).await.unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert_eq!(
            index.mapping("letters").await.get("text_ner").map(String::as_str),
            Some("keyword")
        );
    }

    #[tokio::test]
    async fn test_missing_index() {
        let index = MemoryIndexClient::new();
        let request = ScrollRequest::new(10, Duration::from_secs(60));
        let err = index.open_scroll("nothing", &request).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
    }
}
