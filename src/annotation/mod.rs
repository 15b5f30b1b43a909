//! Annotation pipeline.
//!
//! `markup` and `filters` are pure functions over one sentence's or one
//! document's recognizer output. `DocumentAnnotator` runs the recognizer
//! over a document, and `AnnotationManager` drives the traversal loop that
//! writes results back to the index.

mod annotator;
mod filters;
mod manager;
mod markup;
mod types;

pub use annotator::{annotated_field_name, DocumentAnnotation, DocumentAnnotator};
pub use filters::{aggregate_filters, normalize_surface, FilterCategoryMap, FilterValues};
pub use manager::{AnnotationManager, RunOptions};
pub use markup::render_markup;
pub use types::{AnnotatedSentence, AnnotationEvent, DocumentError, RunSummary};
