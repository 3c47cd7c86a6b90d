//! Collection mappings.
//!
//! A collection is registered when its fragment is bound, but its element,
//! key and index are only resolved by the deferred collection pass, once
//! every entity it mentions is known.

use crate::error::{MappingError, MappingErrorKind};
use crate::naming::collection_role;
use crate::table::{PendingAssociation, ReferentialAction, TableId, TableMapping};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    #[default]
    Set,
    Bag,
    List,
    Map,
    IdBag,
    Array,
}

impl CollectionKind {
    /// Lists, maps and arrays carry an index column.
    pub const fn is_indexed(self) -> bool {
        matches!(
            self,
            CollectionKind::List | CollectionKind::Map | CollectionKind::Array
        )
    }
}

/// The element of a collection as declared by its fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementMapping {
    /// Values stored in the collection table.
    Value {
        columns: Vec<String>,
        #[serde(default)]
        type_name: Option<String>,
    },
    /// Entities whose own table carries the key.
    OneToMany { entity: String },
    /// Entities referenced from a link table.
    ManyToMany {
        #[serde(default)]
        entity: Option<String>,
        columns: Vec<String>,
    },
}

impl ElementMapping {
    pub fn referenced_entity(&self) -> Option<&str> {
        match self {
            ElementMapping::OneToMany { entity } => Some(entity),
            ElementMapping::ManyToMany { entity, .. } => entity.as_deref(),
            ElementMapping::Value { .. } => None,
        }
    }

    pub fn columns(&self) -> &[String] {
        match self {
            ElementMapping::Value { columns, .. } | ElementMapping::ManyToMany { columns, .. } => {
                columns
            }
            ElementMapping::OneToMany { .. } => &[],
        }
    }
}

/// The key linking collection rows back to their owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyMapping {
    pub columns: Vec<String>,
    /// Owner columns the key refers to (identifier or property-ref).
    pub referenced_columns: Vec<String>,
    pub nullable: bool,
    pub on_delete: ReferentialAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexMapping {
    pub columns: Vec<String>,
    pub type_name: Option<String>,
    /// Entity referenced by a many-to-many map key.
    pub entity: Option<String>,
    pub base: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionMapping {
    pub role: String,
    pub owner: String,
    pub property: String,
    pub kind: CollectionKind,
    pub element: ElementMapping,
    /// Collection table. Known at registration for link tables, set by the
    /// collection pass for one-to-many (the element entity's table).
    pub table: Option<TableId>,
    pub key: Option<KeyMapping>,
    pub key_property_ref: Option<String>,
    pub index: Option<IndexMapping>,
    pub identifier_columns: Vec<String>,
    pub inverse: bool,
    pub metas: BTreeMap<String, String>,
    pub keys_created: bool,
}

impl CollectionMapping {
    pub fn new(
        owner: impl Into<String>,
        property: impl Into<String>,
        kind: CollectionKind,
        element: ElementMapping,
    ) -> Self {
        let owner = owner.into();
        let property = property.into();
        Self {
            role: collection_role(&owner, &property),
            owner,
            property,
            kind,
            element,
            table: None,
            key: None,
            key_property_ref: None,
            index: None,
            identifier_columns: Vec::new(),
            inverse: false,
            metas: BTreeMap::new(),
            keys_created: false,
        }
    }

    pub fn is_one_to_many(&self) -> bool {
        matches!(self.element, ElementMapping::OneToMany { .. })
    }

    pub fn is_many_to_many(&self) -> bool {
        matches!(self.element, ElementMapping::ManyToMany { .. })
    }

    /// Has the collection pass resolved this collection?
    pub fn is_bound(&self) -> bool {
        self.table.is_some() && self.key.is_some()
    }

    fn primary_key_columns(&self) -> Vec<String> {
        let key_columns = self
            .key
            .as_ref()
            .map(|k| k.columns.clone())
            .unwrap_or_default();
        match self.kind {
            CollectionKind::IdBag => self.identifier_columns.clone(),
            CollectionKind::List | CollectionKind::Map | CollectionKind::Array => {
                let mut columns = key_columns;
                if let Some(index) = &self.index {
                    columns.extend(index.columns.iter().cloned());
                }
                columns
            }
            CollectionKind::Set => {
                let mut columns = key_columns;
                columns.extend(self.element.columns().iter().cloned());
                columns
            }
            CollectionKind::Bag => Vec::new(),
        }
    }

    /// Declare the collection's foreign keys and primary key on its table.
    ///
    /// Must run exactly once, after the key has been bound.
    pub fn create_all_keys(
        &mut self,
        table: &mut TableMapping,
    ) -> std::result::Result<(), MappingError> {
        if self.keys_created {
            return Err(MappingError::new(
                MappingErrorKind::InvalidState,
                format!("keys of collection {} were already created", self.role),
            )
            .with_role(self.role.clone()));
        }
        let Some(key) = &self.key else {
            return Err(MappingError::new(
                MappingErrorKind::InvalidState,
                format!("collection {} has no bound key", self.role),
            )
            .with_role(self.role.clone()));
        };

        // A property-ref key is constrained by the binder against the
        // referenced property, not the owner's primary key.
        if self.key_property_ref.is_none() {
            table.add_association(PendingAssociation {
                name: None,
                columns: key.columns.clone(),
                referenced_entity: Some(self.owner.clone()),
                on_delete: key.on_delete,
            });
        }
        if let ElementMapping::ManyToMany { entity, columns } = &self.element {
            table.add_association(PendingAssociation {
                name: None,
                columns: columns.clone(),
                referenced_entity: entity.clone(),
                on_delete: ReferentialAction::NoAction,
            });
        }
        if let Some(IndexMapping {
            entity: Some(entity),
            columns,
            ..
        }) = &self.index
        {
            table.add_association(PendingAssociation {
                name: None,
                columns: columns.clone(),
                referenced_entity: Some(entity.clone()),
                on_delete: ReferentialAction::NoAction,
            });
        }
        if !self.inverse && !self.is_one_to_many() {
            table.create_primary_key(&self.primary_key_columns());
        }
        self.keys_created = true;
        Ok(())
    }
}
