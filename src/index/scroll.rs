//! Cursor-based exhaustive traversal of an index.
//!
//! ```text
//! Init -> Fetching -> More <-> Fetching
//!                  \-> Done -> Closed
//! ```
//!
//! `open` performs the initial bounded search. `next_page` keeps fetching
//! until the number of documents seen reaches the total the index reported,
//! or a page comes back empty (cursor expired or the index changed under
//! us). `close` releases the server-side cursor; it is idempotent and must
//! be awaited on every exit path, since `Drop` cannot do async work.

use tracing::{debug, warn};

use super::error::IndexError;
use super::{IndexClient, ScrollRequest};
use crate::models::IndexedDocument;

/// Lifecycle of a traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalState {
    /// No fetch issued yet.
    Init,
    /// A fetch is in flight.
    Fetching,
    /// More documents are expected.
    More,
    /// Everything reachable has been fetched.
    Done,
    /// The cursor has been released.
    Closed,
}

/// Server cursor plus progress counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalCursor {
    pub cursor_token: String,
    pub documents_seen: u64,
    pub total_expected: u64,
}

/// Walks every document of an index one page at a time.
///
/// Owns its cursor exclusively; pages are handed out one at a time and the
/// next fetch is only issued when the caller asks for it.
pub struct ScrollTraversal<'a> {
    client: &'a dyn IndexClient,
    index: String,
    request: ScrollRequest,
    cursor: Option<TraversalCursor>,
    documents_seen: u64,
    total_expected: u64,
    state: TraversalState,
}

impl<'a> ScrollTraversal<'a> {
    pub fn new(client: &'a dyn IndexClient, index: &str, request: ScrollRequest) -> Self {
        Self {
            client,
            index: index.to_string(),
            request,
            cursor: None,
            documents_seen: 0,
            total_expected: 0,
            state: TraversalState::Init,
        }
    }

    pub fn state(&self) -> TraversalState {
        self.state
    }

    pub fn cursor(&self) -> Option<&TraversalCursor> {
        self.cursor.as_ref()
    }

    pub fn documents_seen(&self) -> u64 {
        self.documents_seen
    }

    pub fn total_expected(&self) -> u64 {
        self.total_expected
    }

    /// True once every document the index reported has been fetched.
    pub fn is_exhausted(&self) -> bool {
        self.documents_seen >= self.total_expected
    }

    fn record_progress(&mut self, fetched: usize) {
        self.documents_seen += fetched as u64;
        if let Some(cursor) = self.cursor.as_mut() {
            cursor.documents_seen = self.documents_seen;
        }
        self.state = if self.is_exhausted() {
            TraversalState::Done
        } else {
            TraversalState::More
        };
    }

    /// Issue the initial search and return the first page.
    ///
    /// Failing here is fatal for the run: there is no cursor to continue from.
    pub async fn open(&mut self) -> Result<Vec<IndexedDocument>, IndexError> {
        if self.state != TraversalState::Init {
            return Ok(Vec::new());
        }
        self.state = TraversalState::Fetching;

        let page = match self.client.open_scroll(&self.index, &self.request).await {
            Ok(page) => page,
            Err(e) => {
                self.state = TraversalState::Done;
                return Err(e);
            }
        };

        self.total_expected = page.total;
        self.cursor = page.scroll_id.map(|cursor_token| TraversalCursor {
            cursor_token,
            documents_seen: 0,
            total_expected: page.total,
        });
        self.record_progress(page.hits.len());

        if self.state == TraversalState::More && self.cursor.is_none() {
            warn!(
                "Index {} returned no scroll cursor; stopping after first page",
                self.index
            );
            self.state = TraversalState::Done;
        }

        debug!(
            "Opened traversal of {}: {}/{} documents",
            self.index, self.documents_seen, self.total_expected
        );
        Ok(page.hits)
    }

    /// Fetch the next page, or `None` once the traversal is done.
    ///
    /// An empty page before the expected total is treated as completion.
    pub async fn next_page(&mut self) -> Result<Option<Vec<IndexedDocument>>, IndexError> {
        if self.state != TraversalState::More {
            return Ok(None);
        }
        let Some(token) = self.cursor.as_ref().map(|c| c.cursor_token.clone()) else {
            self.state = TraversalState::Done;
            return Ok(None);
        };

        self.state = TraversalState::Fetching;
        let page = match self.client.next_scroll(&token, self.request.lease).await {
            Ok(page) => page,
            Err(e) => {
                self.state = TraversalState::Done;
                return Err(e);
            }
        };

        if let (Some(cursor), Some(new_token)) = (self.cursor.as_mut(), page.scroll_id) {
            cursor.cursor_token = new_token;
        }

        if page.hits.is_empty() {
            warn!(
                "Cursor for {} returned no documents after {}/{}; treating as complete",
                self.index, self.documents_seen, self.total_expected
            );
            self.state = TraversalState::Done;
            return Ok(None);
        }

        self.record_progress(page.hits.len());
        debug!(
            "Fetched page from {}: {}/{} documents",
            self.index, self.documents_seen, self.total_expected
        );
        Ok(Some(page.hits))
    }

    /// Release the server cursor. Safe to call more than once.
    pub async fn close(&mut self) -> Result<(), IndexError> {
        if self.state == TraversalState::Closed {
            return Ok(());
        }
        self.state = TraversalState::Closed;

        match self.cursor.take() {
            Some(cursor) => {
                debug!("Releasing cursor for {}", self.index);
                self.client.clear_scroll(&cursor.cursor_token).await
            }
            None => Ok(()),
        }
    }
}

impl Drop for ScrollTraversal<'_> {
    fn drop(&mut self) {
        if self.cursor.is_some() {
            warn!(
                "Traversal of {} dropped without releasing its cursor",
                self.index
            );
        }
    }
}
