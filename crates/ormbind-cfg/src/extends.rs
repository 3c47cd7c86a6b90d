//! The extends queue.
//!
//! A document whose entities name superclasses that are not mapped yet is
//! parked here with one entry per missing name; the entries share the
//! document. Once compilation starts the queue is scanned to a fixpoint:
//! the first entry whose superclass now resolves is removed and the scan
//! restarts from the top. When the last entry of a document goes, the
//! document is bound, which may map new entities or park other documents.

use crate::binder;
use crate::mappings::Mappings;
use ormbind_core::{MappingDocument, MappingError, Result, UnresolvedSuperclass};
use std::sync::Arc;

/// A document waiting for `explicit_name` to be mapped.
#[derive(Debug, Clone)]
pub struct ExtendsQueueEntry {
    pub explicit_name: String,
    pub mapping_package: Option<String>,
    pub document: Arc<MappingDocument>,
}

impl ExtendsQueueEntry {
    pub fn new(
        explicit_name: impl Into<String>,
        mapping_package: Option<String>,
        document: Arc<MappingDocument>,
    ) -> Self {
        Self {
            explicit_name: explicit_name.into(),
            mapping_package,
            document,
        }
    }

    /// Is the awaited superclass mapped, by its own name or qualified with
    /// the document package?
    pub fn is_resolvable(&self, mappings: &Mappings) -> bool {
        mappings
            .resolve_class(&self.explicit_name, self.mapping_package.as_deref())
            .is_some()
    }

    /// Does `other` wait on behalf of the same document?
    pub fn shares_document(&self, other: &ExtendsQueueEntry) -> bool {
        Arc::ptr_eq(&self.document, &other.document)
    }

    pub fn unresolved(&self) -> UnresolvedSuperclass {
        UnresolvedSuperclass {
            name: self.explicit_name.clone(),
            package: self.mapping_package.clone(),
        }
    }
}

/// Resolve queued entries until none can make progress, binding each
/// document once all of its entries are gone. Returns the number of entries
/// taken off the queue.
#[tracing::instrument(level = "debug", skip(mappings))]
pub fn process_extends_queue(mappings: &mut Mappings) -> Result<usize> {
    let mut resolved = 0;
    loop {
        let next = {
            let view: &Mappings = mappings;
            view.extends_queue()
                .iter()
                .position(|entry| entry.is_resolvable(view))
        };
        let Some(index) = next else {
            break;
        };
        let entry = mappings.remove_extends_entry(index);
        resolved += 1;
        if mappings
            .extends_queue()
            .iter()
            .any(|other| other.shares_document(&entry))
        {
            tracing::debug!(
                superclass = %entry.explicit_name,
                package = ?entry.mapping_package,
                "Superclass mapped, document still waiting on others"
            );
            continue;
        }
        tracing::debug!(
            superclass = %entry.explicit_name,
            package = ?entry.mapping_package,
            "Superclass mapped, binding deferred document"
        );
        let document = Arc::try_unwrap(entry.document).unwrap_or_else(|shared| (*shared).clone());
        binder::bind_document(mappings, document)?;
    }

    let remaining = mappings.extends_queue();
    if !remaining.is_empty() {
        let unresolved: Vec<_> = remaining.iter().map(ExtendsQueueEntry::unresolved).collect();
        tracing::warn!(count = unresolved.len(), "Unresolved superclasses in extends queue");
        return Err(MappingError::unresolved_superclasses(unresolved).into());
    }
    tracing::info!(resolved, "Extends queue drained");
    Ok(resolved)
}
