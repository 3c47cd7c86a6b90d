//! Property references.
//!
//! An association may target a non-identifier property of another entity
//! (`property-ref`). Such targets are recorded while binding and checked
//! once every structural second pass has run; unique references mark the
//! target value as an alternate unique key of its entity.

use crate::mappings::Mappings;
use ormbind_core::{MappingError, MappingErrorKind, Result};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyReference {
    pub referenced_entity: String,
    pub property_name: String,
    pub unique: bool,
}

impl PropertyReference {
    pub fn new(
        referenced_entity: impl Into<String>,
        property_name: impl Into<String>,
        unique: bool,
    ) -> Self {
        Self {
            referenced_entity: referenced_entity.into(),
            property_name: property_name.into(),
            unique,
        }
    }
}

/// Resolve and consume every queued property reference.
#[tracing::instrument(level = "debug", skip(mappings))]
pub fn resolve_property_references(mappings: &mut Mappings) -> Result<usize> {
    let references = mappings.take_property_references();
    let count = references.len();
    for reference in references {
        let Some(entity) = mappings
            .resolve_entity_name(&reference.referenced_entity)
            .map(str::to_string)
        else {
            return Err(MappingError::new(
                MappingErrorKind::UnmappedClass,
                format!("property-ref to unmapped class: {}", reference.referenced_entity),
            )
            .with_entity(reference.referenced_entity)
            .into());
        };

        let Some(value) = mappings.referenced_property_mut(&entity, &reference.property_name)
        else {
            return Err(MappingError::new(
                MappingErrorKind::PropertyNotFound,
                format!(
                    "property-ref {} not found on entity {}",
                    reference.property_name, entity
                ),
            )
            .with_entity(entity)
            .into());
        };

        if reference.unique {
            value.alternate_unique_key = true;
        }
        tracing::debug!(
            entity = %entity,
            property = %reference.property_name,
            unique = reference.unique,
            "Resolved property reference"
        );
    }
    tracing::info!(count, "Property references resolved");
    Ok(count)
}
