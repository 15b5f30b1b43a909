//! Data models for indexner.

mod document;
mod entity;

pub use document::{IndexedDocument, ScrollPage};
pub use entity::{EntitySpan, Label, Prediction, Token};
