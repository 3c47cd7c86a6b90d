//! The compile orchestrator.
//!
//! A [`Configuration`] owns the fragment repository. Documents are added in
//! any order; [`Configuration::compile`] then resolves everything in a fixed
//! sequence:
//!
//! 1. the extends queue, to a fixpoint
//! 2. the structural second-pass wave, then the query wave
//! 3. property references
//! 4. the foreign keys of every table
//!
//! A compile (or document binding) that fails part way leaves the repository
//! half resolved, so the configuration refuses any further work afterwards.

use crate::binder;
use crate::config::MappingConfig;
use crate::extends::process_extends_queue;
use crate::foreign_key::resolve_all_foreign_keys;
use crate::mappings::Mappings;
use crate::property_ref::resolve_property_references;
use crate::second_pass::{SecondPass, WaveCounts, run_second_passes};
use ormbind_core::{
    CollectionMapping, EntityMapping, MappingDocument, MappingError, MappingErrorKind,
    NamedQueryDefinition, NamedSqlQueryDefinition, Result, ResultSetMapping, TableMapping,
};
use serde::Serialize;
use std::collections::BTreeMap;

/// Lifecycle of a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigurationState {
    /// Accepting documents, not compiled yet (or changed since)
    Open,
    /// Last compile succeeded
    Compiled,
    /// A compile or a document binding failed part way; the repository is
    /// unusable
    Failed,
}

/// What one compile did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompileSummary {
    /// Documents taken off the extends queue
    pub extends_resolved: usize,
    /// Second passes executed per wave
    pub second_passes: WaveCounts,
    /// Property references resolved
    pub property_references: usize,
    /// Foreign keys bound to a target table
    pub foreign_keys: usize,
}

#[derive(Debug)]
pub struct Configuration {
    mappings: Mappings,
    state: ConfigurationState,
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

impl Configuration {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self {
            mappings: Mappings::new(MappingConfig::default()),
            state: ConfigurationState::Open,
        }
    }

    /// Create a configuration with validated settings.
    pub fn with_config(config: MappingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            mappings: Mappings::new(config),
            state: ConfigurationState::Open,
        })
    }

    pub fn config(&self) -> &MappingConfig {
        self.mappings.config()
    }

    pub fn state(&self) -> ConfigurationState {
        self.state
    }

    pub fn is_compiled(&self) -> bool {
        self.state == ConfigurationState::Compiled
    }

    /// The repository, for inspection.
    pub fn mappings(&self) -> &Mappings {
        &self.mappings
    }

    /// The repository, for callers that register fragments directly.
    pub fn mappings_mut(&mut self) -> Result<&mut Mappings> {
        self.ensure_usable()?;
        Ok(&mut self.mappings)
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.state == ConfigurationState::Failed {
            return Err(MappingError::new(
                MappingErrorKind::InvalidState,
                "configuration is unusable after a failed compile",
            )
            .into());
        }
        Ok(())
    }

    /// Bind a mapping document. Anything it references that is not mapped
    /// yet is resolved by the next compile.
    ///
    /// A document that fails validation is rejected and leaves the
    /// configuration as it was. A failure once binding has started leaves
    /// part of the document registered, which poisons the configuration.
    pub fn add_document(&mut self, document: MappingDocument) -> Result<&mut Self> {
        self.ensure_usable()?;
        binder::validate_document(&self.mappings, &document)?;
        if let Err(e) = binder::bind_document(&mut self.mappings, document) {
            self.state = ConfigurationState::Failed;
            tracing::warn!(error = %e, "Document binding failed part way");
            return Err(e);
        }
        self.state = ConfigurationState::Open;
        Ok(self)
    }

    /// Decode a JSON mapping document and bind it.
    pub fn add_json(&mut self, json: &str) -> Result<&mut Self> {
        let document = MappingDocument::from_json_str(json)?;
        self.add_document(document)
    }

    /// Queue caller-supplied deferred work for the next compile.
    pub fn add_second_pass(&mut self, op: SecondPass, at_front: bool) -> Result<&mut Self> {
        self.ensure_usable()?;
        self.mappings.enqueue_second_pass(op, at_front);
        self.state = ConfigurationState::Open;
        Ok(self)
    }

    /// Resolve every deferred reference.
    ///
    /// Compiling again after a success only processes what was added since.
    #[tracing::instrument(level = "info", skip(self))]
    pub fn compile(&mut self) -> Result<CompileSummary> {
        self.ensure_usable()?;
        match Self::run_pipeline(&mut self.mappings) {
            Ok(summary) => {
                self.state = ConfigurationState::Compiled;
                tracing::info!(
                    entities = self.mappings.entity_count(),
                    extends = summary.extends_resolved,
                    structural = summary.second_passes.structural,
                    query = summary.second_passes.query,
                    foreign_keys = summary.foreign_keys,
                    "Mappings compiled"
                );
                Ok(summary)
            }
            Err(e) => {
                self.state = ConfigurationState::Failed;
                tracing::warn!(error = %e, "Compile failed");
                Err(e)
            }
        }
    }

    fn run_pipeline(mappings: &mut Mappings) -> Result<CompileSummary> {
        let extends_resolved = process_extends_queue(mappings)?;
        let second_passes = run_second_passes(mappings)?;
        let property_references = resolve_property_references(mappings)?;
        let foreign_keys = resolve_all_foreign_keys(mappings)?;
        Ok(CompileSummary {
            extends_resolved,
            second_passes,
            property_references,
            foreign_keys,
        })
    }

    // ==================== Outputs ====================

    pub fn entity_mappings(&self) -> impl Iterator<Item = &EntityMapping> {
        self.mappings.entities()
    }

    pub fn collection_mappings(&self) -> impl Iterator<Item = &CollectionMapping> {
        self.mappings.collections()
    }

    pub fn table_mappings(&self) -> impl Iterator<Item = &TableMapping> {
        self.mappings.tables()
    }

    pub fn named_queries(&self) -> &BTreeMap<String, NamedQueryDefinition> {
        self.mappings.queries()
    }

    pub fn named_sql_queries(&self) -> &BTreeMap<String, NamedSqlQueryDefinition> {
        self.mappings.sql_queries()
    }

    pub fn result_set_mappings(&self) -> &BTreeMap<String, ResultSetMapping> {
        self.mappings.result_set_mappings()
    }
}
