//! indexner - named-entity annotation for search index documents.
//!
//! Walks every document of an index with a scroll cursor, runs the text of
//! one field through a named-entity recognizer, and writes back an
//! annotated-text copy of the field plus keyword filter fields per entity
//! category.

pub mod annotation;
pub mod config;
pub mod context;
pub mod index;
pub mod models;
pub mod recognizer;
pub mod storage;
