//! Core types for ormbind.
//!
//! This crate provides the passive side of mapping resolution:
//!
//! - Mapping model (`EntityMapping`, `CollectionMapping`, `TableMapping`,
//!   `ForeignKeyMapping`) mutated in place by the resolver
//! - Fragment shapes (`MappingDocument` and friends) a parser hands over
//! - `Error` taxonomy shared by every stage
//! - Identifier quoting and qualification helpers

pub mod collection;
pub mod entity;
pub mod error;
pub mod fragment;
pub mod naming;
pub mod query;
pub mod table;
pub mod value;

pub use collection::{CollectionKind, CollectionMapping, ElementMapping, IndexMapping, KeyMapping};
pub use entity::{EntityMapping, InheritanceKind};
pub use error::{
    ConfigError, Error, MappingError, MappingErrorKind, Result, UnresolvedSuperclass,
};
pub use fragment::{
    CollectionFragment, CollectionIdSpec, EntityFragment, IdentifierSpec, ImportSpec, IndexSpec,
    KeySpec, MappingDocument, NamedQueryFragment, NamedSqlQueryFragment, PropertyKind,
    PropertySpec, QueryOptionsSpec, ResultSetFragment, ReturnSpec,
};
pub use query::{
    NamedQueryDefinition, NamedSqlQueryDefinition, QueryOptions, QueryReturn, ResultBinding,
    ResultSetMapping,
};
pub use table::{
    Column, ForeignKeyId, ForeignKeyMapping, PendingAssociation, PrimaryKey, ReferentialAction,
    TableId, TableIdentity, TableMapping, UniqueKey,
};
pub use value::{IdentifierMapping, PropertyMapping, ValueKind, ValueMapping};
