//! ormbind - resolve independently authored ORM mapping fragments into one
//! consistent schema model.
//!
//! Mapping documents describe entities, collections and named queries. They
//! may arrive in any order: a subclass before its superclass, a collection
//! before the entity it holds, a native query before the result set it
//! names. ormbind accumulates them and, on `compile()`, resolves:
//!
//! - inheritance forward references (the extends queue)
//! - deferred binding work, structural operations before query operations
//! - property references to non-identifier properties
//! - foreign keys, following joined-subclass chains to the table that holds
//!   the key
//!
//! # Quick Start
//!
//! ```ignore
//! use ormbind::prelude::*;
//!
//! let mut cfg = Configuration::new();
//! cfg.add_document(
//!     MappingDocument::new()
//!         .entity(EntityFragment::joined_subclass("Manager", "Employee").key_columns(&["MGR_ID"])),
//! )?;
//! cfg.add_document(
//!     MappingDocument::new()
//!         .entity(EntityFragment::root("Employee", IdentifierSpec::simple("id", "EMP_ID"))),
//! )?;
//!
//! let summary = cfg.compile()?;
//! assert_eq!(summary.extends_resolved, 1);
//! for table in cfg.table_mappings() {
//!     println!("{} -> {} foreign keys", table.qualified_name(), table.foreign_keys.len());
//! }
//! ```

// Re-export all public types from sub-crates
pub use ormbind_core::{
    // Collections
    CollectionKind,
    CollectionMapping,
    // Tables
    Column,
    ConfigError,
    ElementMapping,
    // Entities
    EntityMapping,
    // Errors
    Error,
    ForeignKeyId,
    ForeignKeyMapping,
    IdentifierMapping,
    IndexMapping,
    InheritanceKind,
    KeyMapping,
    MappingError,
    MappingErrorKind,
    // Queries
    NamedQueryDefinition,
    NamedSqlQueryDefinition,
    PendingAssociation,
    PrimaryKey,
    PropertyMapping,
    QueryOptions,
    QueryReturn,
    ReferentialAction,
    Result,
    ResultBinding,
    ResultSetMapping,
    TableId,
    TableIdentity,
    TableMapping,
    UniqueKey,
    UnresolvedSuperclass,
    ValueKind,
    ValueMapping,
};

// Fragment shapes
pub use ormbind_core::{
    CollectionFragment, CollectionIdSpec, EntityFragment, IdentifierSpec, ImportSpec, IndexSpec,
    KeySpec, MappingDocument, NamedQueryFragment, NamedSqlQueryFragment, PropertyKind,
    PropertySpec, QueryOptionsSpec, ResultSetFragment, ReturnSpec,
};

pub use ormbind_core::naming;

// Resolution
pub use ormbind_cfg::{
    CompileSummary, Configuration, ConfigurationState, CustomOp, ExtendsQueueEntry,
    MappingConfig, Mappings, PropertyReference, SecondPass, Wave, WaveCounts,
};

/// Bind every document into a fresh configuration and compile it.
///
/// This is a convenience for callers that have all their documents up front.
pub fn compile_documents<I>(config: MappingConfig, documents: I) -> Result<Configuration>
where
    I: IntoIterator<Item = MappingDocument>,
{
    let mut cfg = Configuration::with_config(config)?;
    for document in documents {
        cfg.add_document(document)?;
    }
    cfg.compile()?;
    Ok(cfg)
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        // Fragments
        CollectionFragment,
        // Resolution
        Configuration,
        ElementMapping,
        EntityFragment,
        // Errors
        Error,
        IdentifierSpec,
        KeySpec,
        MappingConfig,
        MappingDocument,
        MappingErrorKind,
        NamedQueryFragment,
        NamedSqlQueryFragment,
        PropertySpec,
        Result,
        ResultSetFragment,
        ReturnSpec,
        SecondPass,
        TableIdentity,
        Wave,
        compile_documents,
    };
}
