//! Field mapping declaration.
//!
//! The annotated field and every filter field must exist with the right
//! type before the first document update. Declaring is idempotent: fields
//! that already carry the requested type are left alone.

use tracing::{debug, info};

use super::{FieldMappings, IndexClient, IndexError};
use crate::config::ConfigError;

/// What `ensure_mappings` changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingOutcome {
    /// Fields newly declared.
    pub declared: Vec<String>,
    /// Fields that already had the requested type.
    pub unchanged: Vec<String>,
}

impl MappingOutcome {
    pub fn is_noop(&self) -> bool {
        self.declared.is_empty()
    }
}

/// Fields of `wanted` split into already-present and missing, without
/// writing anything. Fails on the first field mapped with another type.
pub async fn plan_mappings(
    client: &dyn IndexClient,
    index: &str,
    wanted: &FieldMappings,
) -> Result<(MappingOutcome, FieldMappings), ConfigError> {
    let existing = client.get_mapping(index).await?;

    let mut outcome = MappingOutcome::default();
    let mut missing = FieldMappings::new();

    for (field, field_type) in wanted {
        match existing.get(field) {
            Some(current) if current == field_type => {
                debug!("{}.{} already mapped as {}", index, field, field_type);
                outcome.unchanged.push(field.clone());
            }
            Some(current) => {
                return Err(ConfigError::MappingConflict {
                    index: index.to_string(),
                    field: field.clone(),
                    existing: current.clone(),
                    requested: field_type.clone(),
                });
            }
            None => {
                missing.insert(field.clone(), field_type.clone());
            }
        }
    }

    Ok((outcome, missing))
}

/// Make sure every field in `wanted` exists in `index` with the given type.
///
/// A field that exists with a different type is a conflict and fails before
/// anything is written.
pub async fn ensure_mappings(
    client: &dyn IndexClient,
    index: &str,
    wanted: &FieldMappings,
) -> Result<MappingOutcome, ConfigError> {
    let (mut outcome, missing) = plan_mappings(client, index, wanted).await?;
    if missing.is_empty() {
        return Ok(outcome);
    }

    match client.put_mapping(index, &missing).await {
        Ok(()) => {}
        // Lost a race with another writer declaring the same field differently.
        Err(IndexError::Status {
            status: 400, body, ..
        }) => {
            return Err(ConfigError::Invalid(format!(
                "index '{}' rejected mappings {:?}: {}",
                index,
                missing.keys().collect::<Vec<_>>(),
                body
            )));
        }
        Err(e) => return Err(e.into()),
    }

    for (field, field_type) in missing {
        info!("Declared {}.{} as {}", index, field, field_type);
        outcome.declared.push(field);
    }
    Ok(outcome)
}
