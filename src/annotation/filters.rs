//! Categorical filter fields derived from entity labels.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::config::FILTER_FIELD_TYPE;
use crate::index::FieldMappings;
use crate::models::EntitySpan;

/// Filter field name to the set of normalized entity texts.
pub type FilterValues = BTreeMap<String, BTreeSet<String>>;

/// Entity category code (label value) to derived filter field name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterCategoryMap(BTreeMap<String, String>);

impl Default for FilterCategoryMap {
    fn default() -> Self {
        Self::from_pairs(&[
            ("PER", "ner:person"),
            ("LOC", "ner:location"),
            ("ORG", "ner:organization"),
            ("MISC", "ner:miscellaneous"),
        ])
    }
}

impl FilterCategoryMap {
    pub fn new(categories: BTreeMap<String, String>) -> Self {
        Self(categories)
    }

    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self(
            pairs
                .iter()
                .map(|(code, field)| (code.to_string(), field.to_string()))
                .collect(),
        )
    }

    /// Filter field for a category code.
    pub fn field_for(&self, code: &str) -> Option<&str> {
        self.0.get(code).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Distinct filter field names.
    pub fn fields(&self) -> BTreeSet<&str> {
        self.0.values().map(String::as_str).collect()
    }

    /// Mappings to declare for the filter fields.
    pub fn mappings(&self) -> FieldMappings {
        self.fields()
            .into_iter()
            .map(|field| (field.to_string(), FILTER_FIELD_TYPE.to_string()))
            .collect()
    }
}

/// Strip everything but letters and digits: "U.S. Army" becomes "USArmy".
///
/// A surface made only of punctuation or whitespace normalizes to the empty
/// string, which `aggregate_filters` does not record as a filter value.
pub fn normalize_surface(text: &str) -> String {
    text.chars().filter(|c| c.is_alphanumeric()).collect()
}

/// Collect filter values for all entities of a document.
///
/// Every configured field is present in the result, empty if nothing
/// matched. Every label of a span counts, not only the first. Spans whose
/// normalized surface is empty contribute no value.
pub fn aggregate_filters(entities: &[EntitySpan], categories: &FilterCategoryMap) -> FilterValues {
    let mut values: FilterValues = categories
        .fields()
        .into_iter()
        .map(|field| (field.to_string(), BTreeSet::new()))
        .collect();

    for span in entities {
        for label in &span.labels {
            let Some(field) = categories.field_for(&label.value) else {
                continue;
            };
            let normalized = normalize_surface(&span.text);
            if normalized.is_empty() {
                continue;
            }
            if let Some(set) = values.get_mut(field) {
                set.insert(normalized);
            }
        }
    }

    values
}
