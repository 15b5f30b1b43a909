//! Types shared by the annotator and the run loop.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::index::IndexError;
use crate::models::EntitySpan;
use crate::recognizer::RecognizerError;

/// Events emitted during an annotation run.
/// Used by the CLI to drive progress bars and status messages.
#[derive(Debug, Clone)]
pub enum AnnotationEvent {
    Started {
        total_documents: u64,
    },
    DocumentStarted {
        document_id: String,
    },
    DocumentCompleted {
        document_id: String,
        entities: usize,
    },
    DocumentFailed {
        document_id: String,
        error: String,
    },
    DocumentSkipped {
        document_id: String,
        reason: String,
    },
    Complete {
        summary: RunSummary,
    },
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Stopped between documents by a cancellation request.
    pub cancelled: bool,
    /// Every page the index reported was fetched without error.
    pub traversal_complete: bool,
    /// Document count the index reported when the traversal opened.
    pub total_expected: u64,
    /// Entity archive written at the end of the run.
    pub archive_path: Option<PathBuf>,
}

impl RunSummary {
    pub fn processed(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }
}

/// Entities found in one sentence, with offsets relative to that sentence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedSentence {
    pub text: String,
    pub entities: Vec<EntitySpan>,
}

/// Recoverable failure of a single document. Logged and counted, never fatal.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("sentence {sentence}: {source}")]
    Recognizer {
        sentence: usize,
        #[source]
        source: RecognizerError,
    },

    #[error("update failed: {0}")]
    Update(#[source] IndexError),
}
