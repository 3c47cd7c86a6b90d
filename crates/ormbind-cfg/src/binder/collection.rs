//! Collection registration and the deferred collection pass.

use super::{DocumentContext, bind_columns};
use crate::mappings::{Mappings, unknown_role};
use crate::property_ref::PropertyReference;
use crate::second_pass::SecondPass;
use ormbind_core::naming::{collection_role, is_valid_role, unqualify};
use ormbind_core::{
    CollectionFragment, CollectionKind, CollectionMapping, ElementMapping, ForeignKeyMapping,
    IndexMapping, KeyMapping, MappingError, MappingErrorKind, PropertyMapping, Result,
    TableIdentity, ValueKind, ValueMapping,
};
use std::collections::BTreeMap;

/// Register a collection under its role and defer the rest of its binding.
pub fn register_collection(
    mappings: &mut Mappings,
    mut fragment: CollectionFragment,
    ctx: &DocumentContext,
) -> Result<()> {
    fragment.owner = ctx.qualify(&fragment.owner);
    let role = collection_role(&fragment.owner, &fragment.property);
    if !is_valid_role(&role) {
        return Err(MappingError::new(
            MappingErrorKind::InvalidFragment,
            format!("invalid collection role '{}'", role),
        )
        .with_role(role)
        .into());
    }
    if mappings.collection(&role).is_some() {
        return Err(MappingError::duplicate("collection role", &role)
            .with_role(role)
            .into());
    }

    fragment.element = match fragment.element {
        ElementMapping::OneToMany { entity } => ElementMapping::OneToMany {
            entity: ctx.qualify(&entity),
        },
        ElementMapping::ManyToMany { entity, columns } => ElementMapping::ManyToMany {
            entity: entity.map(|e| ctx.qualify(&e)),
            columns,
        },
        value @ ElementMapping::Value { .. } => value,
    };
    if let Some(index) = fragment.index.as_mut() {
        index.entity = index.entity.as_deref().map(|e| ctx.qualify(e));
    }

    let table = if matches!(fragment.element, ElementMapping::OneToMany { .. }) {
        None
    } else {
        let identity = fragment.table.clone().unwrap_or_else(|| {
            TableIdentity::new(format!("{}_{}", unqualify(&fragment.owner), fragment.property))
        });
        Some(mappings.add_or_get_table(identity))
    };

    let mut collection = CollectionMapping::new(
        fragment.owner.clone(),
        fragment.property.clone(),
        fragment.kind,
        fragment.element.clone(),
    );
    collection.table = table;
    collection.inverse = fragment.inverse;
    collection.key_property_ref.clone_from(&fragment.key.property_ref);
    mappings.add_collection(collection)?;

    mappings.enqueue_second_pass(
        SecondPass::BindCollection {
            role,
            fragment: Box::new(fragment),
            inherited_metas: ctx.metas.clone(),
        },
        false,
    );
    Ok(())
}

/// Resolve a registered collection against the now complete entity set and
/// create its keys.
#[tracing::instrument(level = "debug", skip(mappings, fragment, inherited_metas))]
pub fn bind_collection(
    mappings: &mut Mappings,
    role: &str,
    fragment: &CollectionFragment,
    inherited_metas: &BTreeMap<String, String>,
) -> Result<()> {
    let Some(collection) = mappings.collection(role) else {
        return Err(unknown_role(role).into());
    };
    if collection.is_bound() {
        return Err(MappingError::new(
            MappingErrorKind::InvalidState,
            format!("collection {} is already bound", role),
        )
        .with_role(role)
        .into());
    }
    let registered_table = collection.table;

    let Some(owner) = mappings
        .resolve_entity_name(&fragment.owner)
        .map(str::to_string)
    else {
        return Err(unmapped(role, &fragment.owner));
    };

    // One-to-many rows live in the element entity's table.
    let (table, element_entity) = match &fragment.element {
        ElementMapping::OneToMany { entity } => {
            let Some(target) = mappings.locate_entity(entity) else {
                return Err(unmapped(role, entity));
            };
            (target.table, Some(target.entity_name.clone()))
        }
        ElementMapping::ManyToMany { .. } | ElementMapping::Value { .. } => {
            let Some(table) = registered_table else {
                return Err(MappingError::new(
                    MappingErrorKind::InvalidState,
                    format!("collection {} was registered without a table", role),
                )
                .with_role(role)
                .into());
            };
            (table, None)
        }
    };

    let referenced_columns = match &fragment.key.property_ref {
        Some(property_ref) => {
            let Some(value) = mappings.referenced_property(&owner, property_ref) else {
                return Err(MappingError::new(
                    MappingErrorKind::PropertyNotFound,
                    format!(
                        "collection key property-ref {} not found on entity {}",
                        property_ref, owner
                    ),
                )
                .with_role(role)
                .with_entity(owner)
                .into());
            };
            let columns = value.columns.clone();
            mappings.add_property_reference(PropertyReference::new(&owner, property_ref, false));
            columns
        }
        None => mappings.entity_key_columns(&owner),
    };

    let key_nullable = !fragment.key.not_null;
    let key_columns = bind_columns(
        mappings,
        table,
        &fragment.key.columns,
        None,
        key_nullable,
        false,
    )?;
    if key_columns.is_empty() {
        return Err(MappingError::new(
            MappingErrorKind::InvalidFragment,
            format!("collection {} declares no key columns", role),
        )
        .with_role(role)
        .into());
    }
    let key = KeyMapping {
        columns: key_columns,
        referenced_columns,
        nullable: key_nullable,
        on_delete: fragment.key.on_delete,
    };

    let element = match &fragment.element {
        ElementMapping::Value { columns, type_name } => ElementMapping::Value {
            columns: bind_columns(
                mappings,
                table,
                columns,
                type_name.as_deref(),
                fragment.kind != CollectionKind::Set,
                false,
            )?,
            type_name: type_name.clone(),
        },
        ElementMapping::ManyToMany { entity, columns } => ElementMapping::ManyToMany {
            entity: entity.clone(),
            columns: bind_columns(mappings, table, columns, None, false, false)?,
        },
        one_to_many @ ElementMapping::OneToMany { .. } => one_to_many.clone(),
    };

    let index = match &fragment.index {
        Some(spec) => Some(IndexMapping {
            columns: bind_columns(
                mappings,
                table,
                &spec.columns,
                spec.type_name.as_deref(),
                false,
                false,
            )?,
            type_name: spec.type_name.clone(),
            entity: spec.entity.clone(),
            base: spec.base,
        }),
        None => None,
    };
    if fragment.kind.is_indexed() && index.is_none() {
        return Err(MappingError::new(
            MappingErrorKind::InvalidFragment,
            format!("indexed collection {} declares no index", role),
        )
        .with_role(role)
        .into());
    }

    let identifier_columns = match (fragment.kind, &fragment.identifier) {
        (CollectionKind::IdBag, Some(spec)) => bind_columns(
            mappings,
            table,
            &spec.columns,
            spec.type_name.as_deref(),
            false,
            false,
        )?,
        (CollectionKind::IdBag, None) => {
            return Err(MappingError::new(
                MappingErrorKind::InvalidFragment,
                format!("id-bag {} declares no collection identifier", role),
            )
            .with_role(role)
            .into());
        }
        _ => Vec::new(),
    };

    attach_owner_property(mappings, &owner, &fragment.property, role)?;

    if let Some(element_entity) = element_entity.as_deref() {
        if !fragment.inverse && fragment.key.not_null {
            add_backrefs(mappings, element_entity, role, &key, index.as_ref())?;
        }
    }

    // document, then owner, then collection
    let mut metas = inherited_metas.clone();
    if let Some(owner_entity) = mappings.entity(&owner) {
        metas.extend(owner_entity.metas.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    metas.extend(fragment.metas.iter().map(|(k, v)| (k.clone(), v.clone())));

    let Some(collection) = mappings.collection_mut(role) else {
        return Err(unknown_role(role).into());
    };
    collection.table = Some(table);
    collection.element = element;
    collection.index = index;
    collection.identifier_columns = identifier_columns;
    collection.metas = metas;
    let key_columns = key.columns.clone();
    collection.key = Some(key);

    mappings.create_collection_keys(role)?;

    if let Some(property_ref) = &fragment.key.property_ref {
        add_key_property_ref_constraint(mappings, role, table, &owner, property_ref, key_columns)?;
    }

    tracing::debug!(role, table = %mappings.table(table).qualified_name(), "Bound collection");
    Ok(())
}

fn unmapped(role: &str, entity: &str) -> ormbind_core::Error {
    MappingError::new(
        MappingErrorKind::UnmappedClass,
        format!("Association references unmapped class: {}", entity),
    )
    .with_role(role)
    .with_entity(entity)
    .into()
}

/// Make sure the owner exposes the collection as a property.
fn attach_owner_property(
    mappings: &mut Mappings,
    owner: &str,
    property: &str,
    role: &str,
) -> Result<()> {
    let Some(entity) = mappings.entity_mut(owner) else {
        return Err(unmapped(role, owner));
    };
    match entity.property(property) {
        None => {
            entity.add_property(PropertyMapping::new(property, ValueMapping::collection(role)));
            Ok(())
        }
        Some(existing) if existing.value.collection_role() == Some(role) => Ok(()),
        Some(_) => Err(MappingError::duplicate("property", format!("{}.{}", owner, property))
            .with_entity(owner)
            .with_role(role)
            .into()),
    }
}

/// Synthetic properties on the element entity of a unidirectional
/// one-to-many whose key is not nullable.
fn add_backrefs(
    mappings: &mut Mappings,
    element_entity: &str,
    role: &str,
    key: &KeyMapping,
    index: Option<&IndexMapping>,
) -> Result<()> {
    let Some(entity) = mappings.entity_mut(element_entity) else {
        return Err(unmapped(role, element_entity));
    };
    entity.add_property(
        PropertyMapping::new(
            format!("_{}Backref", role),
            ValueMapping::new(
                ValueKind::Backref {
                    role: role.to_string(),
                },
                key.columns.clone(),
            )
            .nullable(false),
        )
        .synthetic(),
    );
    if let Some(index) = index {
        entity.add_property(
            PropertyMapping::new(
                format!("_{}IndexBackref", role),
                ValueMapping::new(
                    ValueKind::IndexBackref {
                        role: role.to_string(),
                    },
                    index.columns.clone(),
                )
                .nullable(false),
            )
            .synthetic(),
        );
    }
    Ok(())
}

/// A key that refers to an owner property rather than its identifier.
fn add_key_property_ref_constraint(
    mappings: &mut Mappings,
    role: &str,
    table: ormbind_core::TableId,
    owner: &str,
    property_ref: &str,
    columns: Vec<String>,
) -> Result<()> {
    let Some(declaring) = mappings.property_owner(owner, property_ref) else {
        return Err(MappingError::new(
            MappingErrorKind::PropertyNotFound,
            format!(
                "collection key property-ref {} not found on entity {}",
                property_ref, owner
            ),
        )
        .with_role(role)
        .with_entity(owner)
        .into());
    };
    let target_table = declaring.table;
    let referenced_columns = declaring
        .find_value(property_ref)
        .map(|v| v.columns.clone())
        .unwrap_or_default();
    let name = mappings.table(table).foreign_key_name(&columns, Some(owner));
    tracing::debug!(role, fk = %name, "Collection key refers to a property-ref");
    mappings.add_resolved_foreign_key(ForeignKeyMapping {
        name,
        table,
        columns,
        referenced_entity: Some(owner.to_string()),
        referenced_table: Some(target_table),
        referenced_columns,
        on_delete: ormbind_core::ReferentialAction::NoAction,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::bind_document;
    use crate::config::MappingConfig;
    use crate::second_pass::run_second_passes;
    use ormbind_core::{
        EntityFragment, IdentifierSpec, IndexSpec, KeySpec, MappingDocument, PropertySpec,
    };

    fn hr() -> MappingDocument {
        MappingDocument::new()
            .with_meta("audited", "true")
            .entity(EntityFragment::root("Dept", IdentifierSpec::simple("id", "DEPT_ID")))
            .entity(
                EntityFragment::root("Employee", IdentifierSpec::simple("id", "EMP_ID"))
                    .property(PropertySpec::basic("name", "NAME")),
            )
    }

    #[test]
    fn one_to_many_uses_element_table_and_adds_backref() {
        let mut m = Mappings::new(MappingConfig::default());
        let document = hr().collection(
            CollectionFragment::one_to_many(
                "Dept",
                "staff",
                "Employee",
                KeySpec::columns(&["DEPT_ID"]).not_null(),
            )
            .with_meta("audited", "false"),
        );
        bind_document(&mut m, document).unwrap();
        assert!(!m.collection("Dept.staff").unwrap().is_bound());

        run_second_passes(&mut m).unwrap();
        let staff = m.collection("Dept.staff").unwrap();
        let employee = m.entity("Employee").unwrap();
        assert_eq!(staff.table, Some(employee.table));
        assert!(staff.keys_created);
        assert_eq!(staff.key.as_ref().unwrap().referenced_columns, vec!["DEPT_ID"]);
        assert_eq!(staff.metas.get("audited").map(String::as_str), Some("false"));

        let backref = employee.property("_Dept.staffBackref").unwrap();
        assert!(backref.synthetic);
        assert_eq!(backref.value.columns, vec!["DEPT_ID"]);
        assert!(!m.table(employee.table).column("DEPT_ID").unwrap().nullable);

        let dept = m.entity("Dept").unwrap();
        assert_eq!(dept.property("staff").unwrap().value.collection_role(), Some("Dept.staff"));
    }

    #[test]
    fn inverse_or_nullable_key_adds_no_backref() {
        let mut m = Mappings::new(MappingConfig::default());
        let document = hr()
            .collection(
                CollectionFragment::one_to_many("Dept", "staff", "Employee", KeySpec::columns(&["DEPT_ID"]))
            )
            .collection(
                CollectionFragment::one_to_many(
                    "Dept",
                    "alumni",
                    "Employee",
                    KeySpec::columns(&["FORMER_DEPT_ID"]).not_null(),
                )
                .inverse(),
            );
        bind_document(&mut m, document).unwrap();
        run_second_passes(&mut m).unwrap();

        let employee = m.entity("Employee").unwrap();
        assert!(employee.properties.iter().all(|p| !p.synthetic));
    }

    #[test]
    fn list_of_values_gets_link_table_and_index_key() {
        let mut m = Mappings::new(MappingConfig::default());
        let document = hr().collection(
            CollectionFragment::new(
                "Employee",
                "nicknames",
                CollectionKind::List,
                KeySpec::columns(&["EMP_ID"]).not_null(),
                ElementMapping::Value {
                    columns: vec!["NICKNAME".to_string()],
                    type_name: Some("string".to_string()),
                },
            )
            .index(IndexSpec::column("POS")),
        );
        bind_document(&mut m, document).unwrap();
        run_second_passes(&mut m).unwrap();

        let nicknames = m.collection("Employee.nicknames").unwrap();
        let table = m.table(nicknames.table.unwrap());
        assert_eq!(table.name(), "Employee_nicknames");
        assert_eq!(table.primary_key.as_ref().unwrap().columns, vec!["EMP_ID", "POS"]);
        assert_eq!(table.pending_associations.len(), 1);
    }

    #[test]
    fn unmapped_element_entity_fails() {
        let mut m = Mappings::new(MappingConfig::default());
        let document = hr().collection(CollectionFragment::one_to_many(
            "Dept",
            "projects",
            "Project",
            KeySpec::columns(&["DEPT_ID"]),
        ));
        bind_document(&mut m, document).unwrap();

        let err = run_second_passes(&mut m).unwrap_err();
        assert!(err.is_mapping_kind(MappingErrorKind::UnmappedClass));
        assert!(err.to_string().contains("Association references unmapped class: Project"));
        assert!(err.to_string().contains("role 'Dept.projects'"));
    }

    #[test]
    fn indexed_collection_without_index_is_invalid() {
        let mut m = Mappings::new(MappingConfig::default());
        let document = hr().collection(CollectionFragment::new(
            "Employee",
            "skills",
            CollectionKind::List,
            KeySpec::columns(&["EMP_ID"]),
            ElementMapping::Value {
                columns: vec!["SKILL".to_string()],
                type_name: None,
            },
        ));
        bind_document(&mut m, document).unwrap();
        let err = run_second_passes(&mut m).unwrap_err();
        assert!(err.is_mapping_kind(MappingErrorKind::InvalidFragment));
    }

    #[test]
    fn duplicate_role_is_rejected_at_registration() {
        let mut m = Mappings::new(MappingConfig::default());
        let fragment =
            CollectionFragment::one_to_many("Dept", "staff", "Employee", KeySpec::columns(&["DEPT_ID"]));
        let document = hr().collection(fragment.clone()).collection(fragment);
        let err = bind_document(&mut m, document).unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(m.collections().count(), 1);
    }

    #[test]
    fn key_property_ref_is_recorded_and_constrained() {
        let mut m = Mappings::new(MappingConfig::default());
        let document = MappingDocument::new()
            .entity(
                EntityFragment::root("Customer", IdentifierSpec::simple("id", "ID"))
                    .property(PropertySpec::basic("code", "CODE").unique()),
            )
            .entity(EntityFragment::root("Invoice", IdentifierSpec::simple("id", "ID")))
            .collection(CollectionFragment::one_to_many(
                "Customer",
                "invoices",
                "Invoice",
                KeySpec::columns(&["CUSTOMER_CODE"]).property_ref("code"),
            ));
        bind_document(&mut m, document).unwrap();
        run_second_passes(&mut m).unwrap();

        assert_eq!(
            m.property_references(),
            &[PropertyReference::new("Customer", "code", false)]
        );
        let invoice_table = m.table(m.entity("Invoice").unwrap().table);
        let fk = invoice_table.foreign_key("fk_Invoice_CUSTOMER_CODE").unwrap();
        assert_eq!(fk.referenced_columns, vec!["CODE"]);
        assert!(invoice_table.pending_associations.is_empty());
    }

    #[test]
    fn backref_and_key_constraint_lookups_report_failures() {
        let mut m = Mappings::new(MappingConfig::default());
        bind_document(&mut m, hr()).unwrap();
        let key = KeyMapping {
            columns: vec!["DEPT_ID".to_string()],
            referenced_columns: vec!["DEPT_ID".to_string()],
            nullable: false,
            on_delete: ormbind_core::ReferentialAction::NoAction,
        };

        let err = add_backrefs(&mut m, "Contractor", "Dept.staff", &key, None).unwrap_err();
        assert!(err.is_mapping_kind(MappingErrorKind::UnmappedClass));

        let employee_table = m.entity("Employee").unwrap().table;
        let err = add_key_property_ref_constraint(
            &mut m,
            "Dept.staff",
            employee_table,
            "Dept",
            "code",
            vec!["DEPT_CODE".to_string()],
        )
        .unwrap_err();
        assert!(err.is_mapping_kind(MappingErrorKind::PropertyNotFound));
        assert!(m.table(employee_table).foreign_keys.is_empty());
    }
}
