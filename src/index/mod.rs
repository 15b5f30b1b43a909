//! Search index access.
//!
//! `IndexClient` is the seam between the pipeline and the index. The
//! `HttpIndexClient` speaks the Elasticsearch REST API; `MemoryIndexClient`
//! keeps everything in process for dry runs and tests.

mod client;
mod error;
mod memory;
pub mod retry;
pub mod schema;
pub mod scroll;

pub use client::HttpIndexClient;
pub use error::IndexError;
pub use memory::{IndexCallCounts, MemoryIndexClient};
pub use retry::RetryPolicy;
pub use schema::{ensure_mappings, plan_mappings, MappingOutcome};
pub use scroll::{ScrollTraversal, TraversalCursor, TraversalState};

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::models::ScrollPage;

/// Field name to mapping type (`"text"`, `"keyword"`, `"annotated_text"`).
pub type FieldMappings = BTreeMap<String, String>;

/// Parameters for opening a scroll cursor.
#[derive(Debug, Clone)]
pub struct ScrollRequest {
    /// Documents per page.
    pub page_size: usize,
    /// How long the server keeps the cursor alive between fetches.
    pub lease: Duration,
    /// Restrict `_source` to these fields. Empty means the whole source.
    pub source_fields: Vec<String>,
}

impl ScrollRequest {
    pub fn new(page_size: usize, lease: Duration) -> Self {
        Self {
            page_size,
            lease,
            source_fields: Vec::new(),
        }
    }

    pub fn with_source_field(mut self, field: &str) -> Self {
        self.source_fields.push(field.to_string());
        self
    }
}

/// Format a duration as an index time unit (`"300s"`, `"1500ms"`).
pub fn lease_param(lease: Duration) -> String {
    if lease.subsec_millis() == 0 {
        format!("{}s", lease.as_secs())
    } else {
        format!("{}ms", lease.as_millis())
    }
}

/// Operations the pipeline needs from a search index.
#[async_trait]
pub trait IndexClient: Send + Sync {
    /// Check that the index server answers.
    async fn ping(&self) -> Result<(), IndexError>;

    /// Run the initial bounded search and open a scroll cursor.
    async fn open_scroll(
        &self,
        index: &str,
        request: &ScrollRequest,
    ) -> Result<ScrollPage, IndexError>;

    /// Fetch the next page for a cursor, renewing its lease.
    async fn next_scroll(&self, scroll_id: &str, lease: Duration)
        -> Result<ScrollPage, IndexError>;

    /// Release a cursor. Releasing an unknown or expired cursor is not an error.
    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), IndexError>;

    /// Merge `doc` into the stored document (partial update).
    async fn update_document(&self, index: &str, id: &str, doc: &Value)
        -> Result<(), IndexError>;

    /// Read the top-level field mappings of an index.
    async fn get_mapping(&self, index: &str) -> Result<FieldMappings, IndexError>;

    /// Declare new field mappings.
    async fn put_mapping(&self, index: &str, fields: &FieldMappings) -> Result<(), IndexError>;
}
