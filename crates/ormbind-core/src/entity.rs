//! Entity mappings.

use crate::table::TableId;
use crate::value::{IdentifierMapping, PropertyMapping, ValueMapping};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How an entity's state is laid out relative to its superclass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InheritanceKind {
    /// Top of a hierarchy, owns the identifier.
    #[default]
    Root,
    /// Single-table subclass: shares the superclass table.
    Subclass,
    /// Own table linked to the superclass table by a key + foreign key.
    JoinedSubclass,
    /// Own table holding inherited and declared columns.
    UnionSubclass,
}

impl InheritanceKind {
    pub const fn is_subclass(self) -> bool {
        !matches!(self, InheritanceKind::Root)
    }

    pub const fn label(self) -> &'static str {
        match self {
            InheritanceKind::Root => "class",
            InheritanceKind::Subclass => "subclass",
            InheritanceKind::JoinedSubclass => "joined-subclass",
            InheritanceKind::UnionSubclass => "union-subclass",
        }
    }
}

/// A persistent class bound into the repository.
#[derive(Debug, Clone, Serialize)]
pub struct EntityMapping {
    pub entity_name: String,
    pub kind: InheritanceKind,
    /// Resolved superclass entity name. Set when the entity is bound and
    /// never changed afterwards.
    pub superclass: Option<String>,
    pub table: TableId,
    /// Present on roots only; subclasses inherit it.
    pub identifier: Option<IdentifierMapping>,
    /// Key columns of a joined subclass table.
    pub key_columns: Vec<String>,
    pub properties: Vec<PropertyMapping>,
    pub subclasses: Vec<String>,
    pub metas: BTreeMap<String, String>,
    pub is_abstract: bool,
}

impl EntityMapping {
    pub fn new(entity_name: impl Into<String>, kind: InheritanceKind, table: TableId) -> Self {
        Self {
            entity_name: entity_name.into(),
            kind,
            superclass: None,
            table,
            identifier: None,
            key_columns: Vec::new(),
            properties: Vec::new(),
            subclasses: Vec::new(),
            metas: BTreeMap::new(),
            is_abstract: false,
        }
    }

    pub fn is_root(&self) -> bool {
        self.kind == InheritanceKind::Root
    }

    pub fn is_joined_subclass(&self) -> bool {
        self.kind == InheritanceKind::JoinedSubclass
    }

    pub fn identifier_property_name(&self) -> Option<&str> {
        self.identifier
            .as_ref()
            .and_then(|id| id.property_name.as_deref())
    }

    pub fn property(&self, name: &str) -> Option<&PropertyMapping> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.property(name).is_some()
    }

    /// Add a declared property. Returns `false` if the name is taken.
    pub fn add_property(&mut self, property: PropertyMapping) -> bool {
        if self.has_property(&property.name) {
            return false;
        }
        self.properties.push(property);
        true
    }

    /// Resolve a dotted property path against this entity's own identifier
    /// and declared properties (not the superclass chain).
    pub fn find_value(&self, path: &str) -> Option<&ValueMapping> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut value = self.root_value(first)?;
        for segment in segments {
            value = &value.component_property(segment)?.value;
        }
        Some(value)
    }

    /// Mutable variant of [`EntityMapping::find_value`].
    pub fn find_value_mut(&mut self, path: &str) -> Option<&mut ValueMapping> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut value = self.root_value_mut(first)?;
        for segment in segments {
            value = &mut value.component_property_mut(segment)?.value;
        }
        Some(value)
    }

    fn root_value(&self, name: &str) -> Option<&ValueMapping> {
        if self.identifier_property_name() == Some(name) {
            return self.identifier.as_ref().map(|id| &id.value);
        }
        if let Some(identifier) = &self.identifier {
            if identifier.property_name.is_none() {
                if let Some(part) = identifier.value.component_property(name) {
                    return Some(&part.value);
                }
            }
        }
        self.property(name).map(|p| &p.value)
    }

    fn root_value_mut(&mut self, name: &str) -> Option<&mut ValueMapping> {
        if self.identifier_property_name() == Some(name) {
            return self.identifier.as_mut().map(|id| &mut id.value);
        }
        let embedded_id_part = self.identifier.as_ref().is_some_and(|id| {
            id.property_name.is_none() && id.value.component_property(name).is_some()
        });
        if embedded_id_part {
            return self
                .identifier
                .as_mut()
                .and_then(|id| id.value.component_property_mut(name))
                .map(|p| &mut p.value);
        }
        self.properties
            .iter_mut()
            .find(|p| p.name == name)
            .map(|p| &mut p.value)
    }
}
