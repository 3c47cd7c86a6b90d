//! Values and properties bound onto entities.

use serde::Serialize;

/// What a property's value is made of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ValueKind {
    /// A plain column-mapped value.
    Basic,
    /// A to-one association through foreign key columns.
    ManyToOne {
        entity: Option<String>,
        property_ref: Option<String>,
    },
    /// A to-one association sharing the primary key or a property-ref.
    OneToOne {
        entity: Option<String>,
        property_ref: Option<String>,
    },
    /// A collection, bound later under `role`.
    Collection { role: String },
    /// An embedded group of properties.
    Component { properties: Vec<PropertyMapping> },
    /// Synthetic back reference from the element of a one-to-many.
    Backref { role: String },
    /// Synthetic back reference to the list/map index of a one-to-many.
    IndexBackref { role: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueMapping {
    pub kind: ValueKind,
    pub columns: Vec<String>,
    pub type_name: Option<String>,
    pub nullable: bool,
    /// Set when some association targets this value through a unique
    /// property-ref, making it an alternate key of its entity.
    pub alternate_unique_key: bool,
}

impl ValueMapping {
    pub fn new(kind: ValueKind, columns: Vec<String>) -> Self {
        Self {
            kind,
            columns,
            type_name: None,
            nullable: true,
            alternate_unique_key: false,
        }
    }

    pub fn basic(columns: Vec<String>, type_name: Option<String>) -> Self {
        Self {
            type_name,
            ..Self::new(ValueKind::Basic, columns)
        }
    }

    pub fn collection(role: impl Into<String>) -> Self {
        Self::new(ValueKind::Collection { role: role.into() }, Vec::new())
    }

    pub fn component(properties: Vec<PropertyMapping>) -> Self {
        let columns = properties
            .iter()
            .flat_map(|p| p.value.columns.iter().cloned())
            .collect();
        Self::new(ValueKind::Component { properties }, columns)
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn is_alternate_unique_key(&self) -> bool {
        self.alternate_unique_key
    }

    /// The entity a to-one value points at.
    pub fn associated_entity(&self) -> Option<&str> {
        match &self.kind {
            ValueKind::ManyToOne { entity, .. } | ValueKind::OneToOne { entity, .. } => {
                entity.as_deref()
            }
            _ => None,
        }
    }

    /// The role of a collection value.
    pub fn collection_role(&self) -> Option<&str> {
        match &self.kind {
            ValueKind::Collection { role } => Some(role),
            _ => None,
        }
    }

    pub fn component_property(&self, name: &str) -> Option<&PropertyMapping> {
        match &self.kind {
            ValueKind::Component { properties } => properties.iter().find(|p| p.name == name),
            _ => None,
        }
    }

    pub fn component_property_mut(&mut self, name: &str) -> Option<&mut PropertyMapping> {
        match &mut self.kind {
            ValueKind::Component { properties } => {
                properties.iter_mut().find(|p| p.name == name)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyMapping {
    pub name: String,
    pub value: ValueMapping,
    pub unique: bool,
    /// Added by the binder rather than declared by a fragment (backrefs).
    pub synthetic: bool,
}

impl PropertyMapping {
    pub fn new(name: impl Into<String>, value: ValueMapping) -> Self {
        Self {
            name: name.into(),
            value,
            unique: false,
            synthetic: false,
        }
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn synthetic(mut self) -> Self {
        self.synthetic = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentifierMapping {
    /// `None` for an embedded/anonymous identifier.
    pub property_name: Option<String>,
    pub value: ValueMapping,
    pub generator: Option<String>,
}

impl IdentifierMapping {
    pub fn columns(&self) -> &[String] {
        &self.value.columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_columns_are_flattened() {
        let street = PropertyMapping::new(
            "street",
            ValueMapping::basic(vec!["STREET".to_string()], None),
        );
        let zip = PropertyMapping::new(
            "zip",
            ValueMapping::basic(vec!["ZIP".to_string()], Some("string".to_string())),
        );
        let address = ValueMapping::component(vec![street, zip]);

        assert_eq!(address.columns, vec!["STREET", "ZIP"]);
        assert!(address.component_property("zip").is_some());
        assert!(address.component_property("city").is_none());
    }

    #[test]
    fn association_accessors() {
        let value = ValueMapping::new(
            ValueKind::ManyToOne {
                entity: Some("Dept".to_string()),
                property_ref: None,
            },
            vec!["DEPT_ID".to_string()],
        );
        assert_eq!(value.associated_entity(), Some("Dept"));
        assert_eq!(value.collection_role(), None);
        assert!(!value.is_alternate_unique_key());

        let coll = ValueMapping::collection("Dept.staff");
        assert_eq!(coll.collection_role(), Some("Dept.staff"));
    }
}
