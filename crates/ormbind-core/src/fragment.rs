//! Input shapes handed over by a parsing collaborator.
//!
//! One [`MappingDocument`] corresponds to one mapping source (a file, an
//! annotated class). Names inside a document are unqualified unless they
//! contain a dot; they are qualified with the document package when bound.

use crate::collection::{CollectionKind, ElementMapping};
use crate::entity::InheritanceKind;
use crate::error::Result;
use crate::table::{ReferentialAction, TableIdentity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingDocument {
    #[serde(default)]
    pub package: Option<String>,
    /// Overrides the configured auto-import flag for this document.
    #[serde(default)]
    pub auto_import: Option<bool>,
    #[serde(default)]
    pub metas: BTreeMap<String, String>,
    #[serde(default)]
    pub imports: Vec<ImportSpec>,
    #[serde(default)]
    pub entities: Vec<EntityFragment>,
    #[serde(default)]
    pub collections: Vec<CollectionFragment>,
    #[serde(default)]
    pub queries: Vec<NamedQueryFragment>,
    #[serde(default)]
    pub sql_queries: Vec<NamedSqlQueryFragment>,
    #[serde(default)]
    pub result_sets: Vec<ResultSetFragment>,
}

impl MappingDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a document from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let document: Self = serde_json::from_str(json)?;
        tracing::debug!(
            package = ?document.package,
            entities = document.entities.len(),
            collections = document.collections.len(),
            "Decoded mapping document"
        );
        Ok(document)
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metas.insert(key.into(), value.into());
        self
    }

    pub fn import(mut self, import: ImportSpec) -> Self {
        self.imports.push(import);
        self
    }

    pub fn entity(mut self, entity: EntityFragment) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn collection(mut self, collection: CollectionFragment) -> Self {
        self.collections.push(collection);
        self
    }

    pub fn query(mut self, query: NamedQueryFragment) -> Self {
        self.queries.push(query);
        self
    }

    pub fn sql_query(mut self, query: NamedSqlQueryFragment) -> Self {
        self.sql_queries.push(query);
        self
    }

    pub fn result_set(mut self, result_set: ResultSetFragment) -> Self {
        self.result_sets.push(result_set);
        self
    }
}

/// Registers `class` under the (unqualified) `rename`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSpec {
    pub class: String,
    #[serde(default)]
    pub rename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFragment {
    pub name: String,
    /// Superclass as written in the fragment; with the document package it
    /// forms the `(name, package)` pair used by the extends queue.
    #[serde(default)]
    pub superclass: Option<String>,
    #[serde(default)]
    pub kind: InheritanceKind,
    /// Defaults to the unqualified entity name.
    #[serde(default)]
    pub table: Option<TableIdentity>,
    #[serde(default)]
    pub subselect: Option<String>,
    #[serde(default)]
    pub identifier: Option<IdentifierSpec>,
    /// Joined subclasses only; defaults to the superclass key columns.
    #[serde(default)]
    pub key_columns: Vec<String>,
    #[serde(default)]
    pub on_delete: ReferentialAction,
    #[serde(default)]
    pub properties: Vec<PropertySpec>,
    #[serde(default)]
    pub metas: BTreeMap<String, String>,
    #[serde(default)]
    pub is_abstract: bool,
}

impl EntityFragment {
    pub fn root(name: impl Into<String>, identifier: IdentifierSpec) -> Self {
        Self {
            identifier: Some(identifier),
            ..Self::with_kind(name, InheritanceKind::Root)
        }
    }

    pub fn joined_subclass(name: impl Into<String>, superclass: impl Into<String>) -> Self {
        Self {
            superclass: Some(superclass.into()),
            ..Self::with_kind(name, InheritanceKind::JoinedSubclass)
        }
    }

    pub fn union_subclass(name: impl Into<String>, superclass: impl Into<String>) -> Self {
        Self {
            superclass: Some(superclass.into()),
            ..Self::with_kind(name, InheritanceKind::UnionSubclass)
        }
    }

    pub fn subclass(name: impl Into<String>, superclass: impl Into<String>) -> Self {
        Self {
            superclass: Some(superclass.into()),
            ..Self::with_kind(name, InheritanceKind::Subclass)
        }
    }

    fn with_kind(name: impl Into<String>, kind: InheritanceKind) -> Self {
        Self {
            name: name.into(),
            superclass: None,
            kind,
            table: None,
            subselect: None,
            identifier: None,
            key_columns: Vec::new(),
            on_delete: ReferentialAction::NoAction,
            properties: Vec::new(),
            metas: BTreeMap::new(),
            is_abstract: false,
        }
    }

    pub fn table(mut self, table: TableIdentity) -> Self {
        self.table = Some(table);
        self
    }

    pub fn key_columns(mut self, columns: &[&str]) -> Self {
        self.key_columns = columns.iter().map(|c| (*c).to_string()).collect();
        self
    }

    pub fn property(mut self, property: PropertySpec) -> Self {
        self.properties.push(property);
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metas.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierSpec {
    /// `None` for an embedded identifier made of `parts`.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub type_name: Option<String>,
    #[serde(default)]
    pub generator: Option<String>,
    #[serde(default)]
    pub parts: Vec<PropertySpec>,
}

impl IdentifierSpec {
    pub fn simple(name: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            columns: vec![column.into()],
            type_name: None,
            generator: None,
            parts: Vec::new(),
        }
    }

    pub fn embedded(parts: Vec<PropertySpec>) -> Self {
        Self {
            name: None,
            columns: Vec::new(),
            type_name: None,
            generator: None,
            parts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: PropertyKind,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub not_null: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertyKind {
    Basic {
        /// Defaults to the property name.
        #[serde(default)]
        columns: Vec<String>,
        #[serde(default)]
        type_name: Option<String>,
    },
    ManyToOne {
        #[serde(default)]
        entity: Option<String>,
        #[serde(default)]
        columns: Vec<String>,
        #[serde(default)]
        property_ref: Option<String>,
        #[serde(default)]
        foreign_key: Option<String>,
        #[serde(default)]
        on_delete: ReferentialAction,
    },
    OneToOne {
        #[serde(default)]
        entity: Option<String>,
        #[serde(default)]
        property_ref: Option<String>,
        /// Adds a foreign key from the identifier columns.
        #[serde(default)]
        constrained: bool,
    },
    Component {
        properties: Vec<PropertySpec>,
    },
}

impl PropertySpec {
    pub fn basic(name: impl Into<String>, column: impl Into<String>) -> Self {
        Self::new(
            name,
            PropertyKind::Basic {
                columns: vec![column.into()],
                type_name: None,
            },
        )
    }

    pub fn many_to_one(
        name: impl Into<String>,
        entity: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            PropertyKind::ManyToOne {
                entity: Some(entity.into()),
                columns: vec![column.into()],
                property_ref: None,
                foreign_key: None,
                on_delete: ReferentialAction::NoAction,
            },
        )
    }

    pub fn component(name: impl Into<String>, properties: Vec<PropertySpec>) -> Self {
        Self::new(name, PropertyKind::Component { properties })
    }

    pub fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            kind,
            unique: false,
            not_null: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Target a non-identifier property of the associated entity.
    pub fn property_ref(mut self, target: impl Into<String>) -> Self {
        match &mut self.kind {
            PropertyKind::ManyToOne { property_ref, .. }
            | PropertyKind::OneToOne { property_ref, .. } => {
                *property_ref = Some(target.into());
            }
            PropertyKind::Basic { .. } | PropertyKind::Component { .. } => {}
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionFragment {
    pub owner: String,
    pub property: String,
    #[serde(default)]
    pub kind: CollectionKind,
    /// Link table; ignored for one-to-many, whose table is the element
    /// entity's. Defaults to `{Owner}_{property}`.
    #[serde(default)]
    pub table: Option<TableIdentity>,
    pub key: KeySpec,
    pub element: ElementMapping,
    #[serde(default)]
    pub index: Option<IndexSpec>,
    #[serde(default)]
    pub identifier: Option<CollectionIdSpec>,
    #[serde(default)]
    pub inverse: bool,
    #[serde(default)]
    pub metas: BTreeMap<String, String>,
}

impl CollectionFragment {
    pub fn new(
        owner: impl Into<String>,
        property: impl Into<String>,
        kind: CollectionKind,
        key: KeySpec,
        element: ElementMapping,
    ) -> Self {
        Self {
            owner: owner.into(),
            property: property.into(),
            kind,
            table: None,
            key,
            element,
            index: None,
            identifier: None,
            inverse: false,
            metas: BTreeMap::new(),
        }
    }

    pub fn one_to_many(
        owner: impl Into<String>,
        property: impl Into<String>,
        entity: impl Into<String>,
        key: KeySpec,
    ) -> Self {
        Self::new(
            owner,
            property,
            CollectionKind::Set,
            key,
            ElementMapping::OneToMany {
                entity: entity.into(),
            },
        )
    }

    pub fn table(mut self, table: TableIdentity) -> Self {
        self.table = Some(table);
        self
    }

    pub fn index(mut self, index: IndexSpec) -> Self {
        self.index = Some(index);
        self
    }

    pub fn inverse(mut self) -> Self {
        self.inverse = true;
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metas.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySpec {
    pub columns: Vec<String>,
    /// Owner property the key refers to instead of the identifier.
    #[serde(default)]
    pub property_ref: Option<String>,
    #[serde(default)]
    pub not_null: bool,
    #[serde(default)]
    pub on_delete: ReferentialAction,
}

impl KeySpec {
    pub fn columns(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            property_ref: None,
            not_null: false,
            on_delete: ReferentialAction::NoAction,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn property_ref(mut self, property: impl Into<String>) -> Self {
        self.property_ref = Some(property.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub columns: Vec<String>,
    #[serde(default)]
    pub type_name: Option<String>,
    /// Map key entity of a many-to-many map.
    #[serde(default)]
    pub entity: Option<String>,
    #[serde(default)]
    pub base: i32,
}

impl IndexSpec {
    pub fn column(column: impl Into<String>) -> Self {
        Self {
            columns: vec![column.into()],
            type_name: None,
            entity: None,
            base: 0,
        }
    }
}

/// Surrogate identifier of an id-bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionIdSpec {
    pub columns: Vec<String>,
    #[serde(default)]
    pub type_name: Option<String>,
    #[serde(default)]
    pub generator: Option<String>,
}

/// Shared by object and native named queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptionsSpec {
    #[serde(default)]
    pub cacheable: bool,
    #[serde(default)]
    pub cache_region: Option<String>,
    #[serde(default)]
    pub timeout: Option<u32>,
    #[serde(default)]
    pub fetch_size: Option<u32>,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub parameter_types: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedQueryFragment {
    pub name: String,
    pub query: String,
    #[serde(flatten)]
    pub options: QueryOptionsSpec,
}

impl NamedQueryFragment {
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
            options: QueryOptionsSpec::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedSqlQueryFragment {
    pub name: String,
    pub sql: String,
    /// Registered result-set mapping; takes precedence over `returns`.
    #[serde(default)]
    pub result_set_ref: Option<String>,
    #[serde(default)]
    pub returns: Vec<ReturnSpec>,
    #[serde(default)]
    pub synchronized_tables: Vec<String>,
    #[serde(default)]
    pub callable: bool,
    #[serde(flatten)]
    pub options: QueryOptionsSpec,
}

impl NamedSqlQueryFragment {
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
            result_set_ref: None,
            returns: Vec::new(),
            synchronized_tables: Vec::new(),
            callable: false,
            options: QueryOptionsSpec::default(),
        }
    }

    pub fn result_set_ref(mut self, name: impl Into<String>) -> Self {
        self.result_set_ref = Some(name.into());
        self
    }

    pub fn returning(mut self, spec: ReturnSpec) -> Self {
        self.returns.push(spec);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSetFragment {
    pub name: String,
    pub returns: Vec<ReturnSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReturnSpec {
    Root {
        alias: String,
        entity: String,
        #[serde(default)]
        property_results: BTreeMap<String, Vec<String>>,
    },
    /// `property` is written `ownerAlias.propertyName`.
    Join { alias: String, property: String },
    CollectionLoad {
        alias: String,
        role: String,
        #[serde(default)]
        property_results: BTreeMap<String, Vec<String>>,
    },
    Scalar {
        column: String,
        #[serde(default)]
        type_name: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_document_from_json() {
        let json = r#"{
            "package": "org.hr",
            "entities": [
                {
                    "name": "Employee",
                    "identifier": { "name": "id", "columns": ["ID"] },
                    "properties": [
                        { "name": "name", "type": "basic", "columns": ["NAME"] },
                        { "name": "dept", "type": "many_to_one", "entity": "Dept", "columns": ["DEPT_ID"] }
                    ]
                },
                { "name": "Manager", "superclass": "Employee", "kind": "joined_subclass" }
            ],
            "collections": [
                {
                    "owner": "Dept",
                    "property": "staff",
                    "kind": "bag",
                    "key": { "columns": ["DEPT_ID"], "not_null": true },
                    "element": { "type": "one_to_many", "entity": "Employee" }
                }
            ],
            "sql_queries": [
                { "name": "allStaff", "sql": "select * from EMPLOYEE", "result_set_ref": "staff", "cacheable": true }
            ]
        }"#;

        let document = MappingDocument::from_json_str(json).unwrap();
        assert_eq!(document.package.as_deref(), Some("org.hr"));
        assert_eq!(document.entities.len(), 2);
        assert_eq!(document.entities[1].kind, InheritanceKind::JoinedSubclass);
        assert!(matches!(
            document.entities[0].properties[1].kind,
            PropertyKind::ManyToOne { ref entity, .. } if entity.as_deref() == Some("Dept")
        ));
        assert_eq!(document.collections[0].kind, CollectionKind::Bag);
        assert!(document.collections[0].key.not_null);
        assert!(document.sql_queries[0].options.cacheable);
    }

    #[test]
    fn malformed_json_is_a_serde_error() {
        let err = MappingDocument::from_json_str(r#"{"entities": [{"kind": "root"}]}"#).unwrap_err();
        assert!(matches!(err, crate::error::Error::Serde(_)));
    }

    #[test]
    fn property_ref_only_applies_to_associations() {
        let many_to_one = PropertySpec::many_to_one("owner", "Person", "OWNER_SSN").property_ref("ssn");
        assert!(matches!(
            many_to_one.kind,
            PropertyKind::ManyToOne { property_ref: Some(ref p), .. } if p == "ssn"
        ));

        let basic = PropertySpec::basic("name", "NAME").property_ref("ignored");
        assert_eq!(basic, PropertySpec::basic("name", "NAME"));
    }
}
