//! Foreign-key graph resolution.
//!
//! Runs last in compilation, once every table has its primary key. Each
//! table's pending associations are materialised as foreign keys and every
//! foreign key is pointed at the table of the entity it references. A
//! foreign key that targets a joined subclass first resolves the superclass
//! table, so that the subclass-to-superclass link is in place and the chain
//! can be followed to the table that holds the root key.

use crate::mappings::Mappings;
use ormbind_core::{ForeignKeyId, MappingError, MappingErrorKind, Result, TableId};
use std::collections::BTreeSet;

/// Resolve the foreign keys of every registered table. Returns the number of
/// foreign keys bound to a target table.
#[tracing::instrument(level = "debug", skip(mappings))]
pub fn resolve_all_foreign_keys(mappings: &mut Mappings) -> Result<usize> {
    let mut visited = BTreeSet::new();
    let mut resolved = 0;
    for table in mappings.table_ids() {
        resolved += resolve_foreign_keys(mappings, table, &mut visited, 0)?;
    }
    tracing::info!(
        tables = mappings.table_ids().len(),
        resolved,
        "Foreign keys resolved"
    );
    Ok(resolved)
}

/// Materialise and resolve the foreign keys of one table.
///
/// `visited` holds every foreign key already handled in this run; `depth`
/// counts joined-subclass hops taken to get here.
pub fn resolve_foreign_keys(
    mappings: &mut Mappings,
    table: TableId,
    visited: &mut BTreeSet<ForeignKeyId>,
    depth: usize,
) -> Result<usize> {
    let limit = mappings.config().max_inheritance_depth;
    if depth > limit {
        return Err(MappingError::new(
            MappingErrorKind::InheritanceDepthExceeded,
            format!(
                "foreign key resolution exceeded the maximum inheritance depth of {}",
                limit
            ),
        )
        .with_table(mappings.table(table).qualified_name())
        .into());
    }

    let created = mappings.table_mut(table).create_foreign_keys()?;
    if created > 0 {
        tracing::debug!(table = %mappings.table(table).qualified_name(), created, "Created foreign keys");
    }

    let pending: Vec<(ForeignKeyId, Option<String>)> = mappings
        .table(table)
        .foreign_keys
        .iter()
        .filter(|fk| !fk.is_resolved())
        .map(|fk| (fk.id(), fk.referenced_entity.clone()))
        .collect();

    let mut resolved = 0;
    for (id, referenced_entity) in pending {
        if !visited.insert(id.clone()) {
            continue;
        }
        let table_name = mappings.table(table).qualified_name();

        let Some(referenced_entity) = referenced_entity else {
            return Err(MappingError::new(
                MappingErrorKind::MissingReferencedEntity,
                format!(
                    "An association from the table {} does not specify the referenced entity",
                    table_name
                ),
            )
            .with_table(table_name)
            .into());
        };
        let Some(target) = mappings.locate_entity(&referenced_entity) else {
            return Err(MappingError::new(
                MappingErrorKind::UnmappedClass,
                format!(
                    "An association from the table {} refers to an unmapped class: {}",
                    table_name, referenced_entity
                ),
            )
            .with_table(table_name)
            .with_entity(referenced_entity)
            .into());
        };
        let target_table = target.table;
        let superclass_table = if target.is_joined_subclass() {
            target
                .superclass
                .as_deref()
                .and_then(|s| mappings.entity(s))
                .map(|s| s.table)
        } else {
            None
        };

        if let Some(superclass_table) = superclass_table {
            tracing::debug!(
                fk = %id.name,
                entity = %referenced_entity,
                "Target is a joined subclass, resolving superclass table first"
            );
            resolved += resolve_foreign_keys(mappings, superclass_table, visited, depth + 1)?;
        }

        let target_key = mappings.primary_key_columns(target_table);
        let Some(fk) = mappings
            .table_mut(table)
            .foreign_keys
            .iter_mut()
            .find(|fk| fk.id() == id)
        else {
            continue;
        };
        fk.align_columns(target_table, &target_key)
            .map_err(|e| e.with_table(table_name).with_entity(referenced_entity))?;
        resolved += 1;
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::bind_document;
    use crate::config::MappingConfig;
    use crate::second_pass::run_second_passes;
    use ormbind_core::{
        CollectionFragment, EntityFragment, IdentifierSpec, KeySpec, MappingDocument,
        PendingAssociation, PropertySpec, ReferentialAction, TableIdentity,
    };

    fn company() -> MappingDocument {
        MappingDocument::new()
            .entity(
                EntityFragment::root("Employee", IdentifierSpec::simple("id", "EMP_ID"))
                    .table(TableIdentity::new("EMPLOYEE")),
            )
            .entity(
                EntityFragment::joined_subclass("Manager", "Employee")
                    .table(TableIdentity::new("MANAGER"))
                    .key_columns(&["MGR_ID"]),
            )
            .entity(
                EntityFragment::joined_subclass("Director", "Manager")
                    .table(TableIdentity::new("DIRECTOR"))
                    .key_columns(&["DIR_ID"]),
            )
            .entity(EntityFragment::root("Project", IdentifierSpec::simple("id", "PROJ_ID")))
    }

    fn compiled(document: MappingDocument) -> Result<Mappings> {
        let mut m = Mappings::new(MappingConfig::default());
        bind_document(&mut m, document)?;
        run_second_passes(&mut m)?;
        resolve_all_foreign_keys(&mut m)?;
        Ok(m)
    }

    fn table_of(m: &Mappings, entity: &str) -> TableId {
        m.entity(entity).unwrap().table
    }

    #[test]
    fn collection_of_joined_subclass_reaches_root_table() {
        let document = company().collection(CollectionFragment::one_to_many(
            "Project",
            "managers",
            "Manager",
            KeySpec::columns(&["PROJ_ID"]),
        ));
        let m = compiled(document).unwrap();

        let manager = table_of(&m, "Manager");
        let employee = table_of(&m, "Employee");
        let link = m.table(manager).foreign_key("fk_MANAGER_MGR_ID").unwrap();
        assert_eq!(link.referenced_table, Some(employee));
        assert_eq!(link.referenced_columns, vec!["EMP_ID"]);

        let to_project = m.table(manager).foreign_key("fk_MANAGER_PROJ_ID").unwrap();
        assert_eq!(to_project.referenced_table, Some(table_of(&m, "Project")));
        assert_eq!(m.key_owner_table(manager), employee);
    }

    #[test]
    fn multi_level_joined_chain_resolves() {
        let document = company().entity(
            EntityFragment::root("Board", IdentifierSpec::simple("id", "BOARD_ID"))
                .property(PropertySpec::many_to_one("chair", "Director", "CHAIR_ID")),
        );
        let m = compiled(document).unwrap();

        let board = table_of(&m, "Board");
        let director = table_of(&m, "Director");
        let chair = m.table(board).foreign_key("fk_Board_CHAIR_ID").unwrap();
        assert_eq!(chair.referenced_table, Some(director));
        assert_eq!(chair.referenced_columns, vec!["DIR_ID"]);
        assert_eq!(m.key_owner_table(director), table_of(&m, "Employee"));
        assert!(m
            .tables()
            .flat_map(|t| t.foreign_keys.iter())
            .all(|fk| fk.is_resolved()));
    }

    #[test]
    fn foreign_keys_resolve_once_per_run() {
        let mut m = compiled(company()).unwrap();
        assert_eq!(resolve_all_foreign_keys(&mut m).unwrap(), 0);
    }

    #[test]
    fn association_without_entity_is_reported() {
        let mut m = compiled(company()).unwrap();
        let project = table_of(&m, "Project");
        m.table_mut(project).add_association(PendingAssociation {
            name: None,
            columns: vec!["OWNER_ID".to_string()],
            referenced_entity: None,
            on_delete: ReferentialAction::NoAction,
        });
        let err = resolve_all_foreign_keys(&mut m).unwrap_err();
        assert!(err.is_mapping_kind(MappingErrorKind::MissingReferencedEntity));
        assert!(err.to_string().contains("does not specify the referenced entity"));
    }

    #[test]
    fn association_to_unmapped_entity_is_reported() {
        let document = company().entity(
            EntityFragment::root("Task", IdentifierSpec::simple("id", "TASK_ID"))
                .property(PropertySpec::many_to_one("sprint", "Sprint", "SPRINT_ID")),
        );
        let err = compiled(document).unwrap_err();
        assert!(err.is_mapping_kind(MappingErrorKind::UnmappedClass));
        assert!(err.to_string().contains("refers to an unmapped class: Sprint"));
    }

    #[test]
    fn column_count_mismatch_names_the_table() {
        let document = company().entity(
            EntityFragment::root("Badge", IdentifierSpec::simple("id", "BADGE_ID")).property(
                PropertySpec::new(
                    "holder",
                    ormbind_core::PropertyKind::ManyToOne {
                        entity: Some("Employee".to_string()),
                        columns: vec!["HOLDER_A".to_string(), "HOLDER_B".to_string()],
                        property_ref: None,
                        foreign_key: None,
                        on_delete: ReferentialAction::NoAction,
                    },
                ),
            ),
        );
        let err = compiled(document).unwrap_err();
        assert!(err.is_mapping_kind(MappingErrorKind::ColumnCountMismatch));
        assert!(err.to_string().contains("table 'Badge'"));
    }

    #[test]
    fn depth_limit_is_enforced() {
        // BOARD -> DIRECTOR climbs to MANAGER, whose deputy climbs to MANAGER again.
        let document = MappingDocument::new()
            .entity(
                EntityFragment::root("Employee", IdentifierSpec::simple("id", "EMP_ID"))
                    .table(TableIdentity::new("EMPLOYEE")),
            )
            .entity(
                EntityFragment::joined_subclass("Manager", "Employee")
                    .table(TableIdentity::new("MANAGER"))
                    .key_columns(&["MGR_ID"])
                    .property(PropertySpec::many_to_one("deputy", "Director", "DEPUTY_ID")),
            )
            .entity(
                EntityFragment::joined_subclass("Director", "Manager")
                    .table(TableIdentity::new("DIRECTOR"))
                    .key_columns(&["DIR_ID"]),
            )
            .entity(
                EntityFragment::root("Board", IdentifierSpec::simple("id", "BOARD_ID"))
                    .property(PropertySpec::many_to_one("chair", "Director", "CHAIR_ID")),
            );
        let mut m = Mappings::new(MappingConfig::default().max_inheritance_depth(1));
        bind_document(&mut m, document).unwrap();
        run_second_passes(&mut m).unwrap();

        let board = table_of(&m, "Board");
        let mut visited = BTreeSet::new();
        let err = resolve_foreign_keys(&mut m, board, &mut visited, 0).unwrap_err();
        assert!(err.is_mapping_kind(MappingErrorKind::InheritanceDepthExceeded));
        assert!(err.to_string().contains("table 'MANAGER'"));
    }

    #[test]
    fn subclass_link_and_constrained_one_to_one_share_key_columns() {
        let document = company()
            .entity(EntityFragment::root("Office", IdentifierSpec::simple("id", "OFFICE_ID")))
            .entity(
                EntityFragment::joined_subclass("Lead", "Employee")
                    .table(TableIdentity::new("LEAD"))
                    .key_columns(&["LEAD_ID"])
                    .property(PropertySpec::new(
                        "office",
                        ormbind_core::PropertyKind::OneToOne {
                            entity: Some("Office".to_string()),
                            property_ref: None,
                            constrained: true,
                        },
                    )),
            );
        let m = compiled(document).unwrap();

        let lead = m.table(table_of(&m, "Lead"));
        let keys: Vec<_> = lead
            .foreign_keys
            .iter()
            .filter(|fk| fk.columns == vec!["LEAD_ID"])
            .collect();
        assert_eq!(keys.len(), 2);
        assert!(keys.iter().all(|fk| fk.is_resolved()));

        let to_office = lead.foreign_key("fk_LEAD_LEAD_ID").unwrap();
        assert_eq!(to_office.referenced_table, Some(table_of(&m, "Office")));
        let to_employee = lead.foreign_key("fk_LEAD_LEAD_ID_Employee").unwrap();
        assert_eq!(to_employee.referenced_table, Some(table_of(&m, "Employee")));
        assert_eq!(to_employee.referenced_columns, vec!["EMP_ID"]);
        assert_eq!(m.key_owner_table(table_of(&m, "Lead")), table_of(&m, "Employee"));
    }
}
