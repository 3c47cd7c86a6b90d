//! Entity binding and the key-creating second passes.

use super::{DocumentContext, bind_columns};
use crate::mappings::Mappings;
use crate::second_pass::SecondPass;
use ormbind_core::naming::{is_valid_entity_name, unqualify};
use ormbind_core::{
    EntityFragment, EntityMapping, ForeignKeyMapping, IdentifierMapping, IdentifierSpec,
    InheritanceKind, MappingError, MappingErrorKind, PendingAssociation, PropertyKind,
    PropertyMapping, PropertySpec, ReferentialAction, Result, TableId, TableIdentity,
    UnresolvedSuperclass, ValueKind, ValueMapping,
};

/// Bind the entities of one document, superclasses before subclasses.
pub fn bind_entities(
    mappings: &mut Mappings,
    fragments: &[EntityFragment],
    ctx: &DocumentContext,
) -> Result<()> {
    let mut pending: Vec<&EntityFragment> = fragments.iter().collect();
    while !pending.is_empty() {
        let before = pending.len();
        let mut waiting = Vec::new();
        for fragment in pending {
            let ready = match fragment.superclass.as_deref() {
                Some(superclass) if fragment.kind.is_subclass() => mappings
                    .resolve_class(superclass, ctx.package())
                    .is_some(),
                _ => true,
            };
            if ready {
                bind_entity(mappings, fragment, ctx)?;
            } else {
                waiting.push(fragment);
            }
        }
        if waiting.len() == before {
            // Only a cycle inside the document can stall here.
            let unresolved = waiting
                .iter()
                .map(|f| UnresolvedSuperclass {
                    name: f.superclass.clone().unwrap_or_default(),
                    package: ctx.package.clone(),
                })
                .collect();
            return Err(MappingError::unresolved_superclasses(unresolved).into());
        }
        pending = waiting;
    }
    Ok(())
}

/// Bind one entity whose superclass (if any) is already mapped.
#[tracing::instrument(level = "debug", skip(mappings, fragment, ctx), fields(entity = %fragment.name))]
pub fn bind_entity(
    mappings: &mut Mappings,
    fragment: &EntityFragment,
    ctx: &DocumentContext,
) -> Result<()> {
    let entity_name = ctx.qualify(&fragment.name);
    if !is_valid_entity_name(&entity_name) {
        return Err(invalid(&entity_name, format!("invalid entity name '{}'", entity_name)));
    }
    if mappings.entity(&entity_name).is_some() {
        return Err(MappingError::duplicate("class/entity", &entity_name)
            .with_entity(entity_name)
            .into());
    }

    let superclass = resolve_superclass(mappings, fragment, &entity_name, ctx)?;
    let superclass_table = superclass
        .as_deref()
        .and_then(|s| mappings.entity(s))
        .map(|s| s.table);

    let logical_table = fragment
        .table
        .as_ref()
        .map_or_else(|| unqualify(&entity_name).to_string(), |t| t.name.clone());
    let identity = fragment
        .table
        .clone()
        .unwrap_or_else(|| TableIdentity::new(logical_table.clone()));

    let table = match (fragment.kind, superclass_table) {
        (InheritanceKind::Root | InheritanceKind::JoinedSubclass, _) => {
            let id = mappings.add_table(identity, fragment.subselect.clone(), fragment.is_abstract);
            mappings.add_table_binding(&logical_table, id, None)?;
            id
        }
        (InheritanceKind::UnionSubclass, Some(included)) => {
            let id = mappings.add_denormalized_table(identity, included)?;
            mappings.add_table_binding(&logical_table, id, Some(included))?;
            id
        }
        (InheritanceKind::Subclass, Some(shared)) => shared,
        (InheritanceKind::UnionSubclass | InheritanceKind::Subclass, None) => {
            return Err(MappingError::new(
                MappingErrorKind::InvalidState,
                format!("superclass of {} has no table", entity_name),
            )
            .with_entity(entity_name)
            .into());
        }
    };

    let mut entity = EntityMapping::new(entity_name.clone(), fragment.kind, table);
    entity.superclass.clone_from(&superclass);
    entity.is_abstract = fragment.is_abstract;
    entity.metas = ctx.metas.clone();
    entity
        .metas
        .extend(fragment.metas.iter().map(|(k, v)| (k.clone(), v.clone())));

    match (fragment.kind, &fragment.identifier) {
        (InheritanceKind::Root, Some(spec)) => {
            entity.identifier = Some(bind_identifier(mappings, &entity_name, table, spec, ctx)?);
        }
        (InheritanceKind::Root, None) => {
            return Err(invalid(
                &entity_name,
                format!("entity {} declares no identifier", entity_name),
            ));
        }
        (_, Some(_)) => {
            return Err(invalid(
                &entity_name,
                format!(
                    "{} {} must not declare an identifier",
                    fragment.kind.label(),
                    entity_name
                ),
            ));
        }
        (_, None) => {}
    }

    if fragment.kind == InheritanceKind::JoinedSubclass {
        let logical = if fragment.key_columns.is_empty() {
            superclass
                .as_deref()
                .map(|s| mappings.entity_key_columns(s))
                .unwrap_or_default()
        } else {
            fragment.key_columns.clone()
        };
        if logical.is_empty() {
            return Err(invalid(
                &entity_name,
                format!("joined-subclass {} has no key columns", entity_name),
            ));
        }
        entity.key_columns = bind_columns(mappings, table, &logical, None, false, false)?;
    }

    let key_columns = match &entity.identifier {
        Some(identifier) => identifier.columns().to_vec(),
        None => entity.key_columns.clone(),
    };
    let scope = PropertyScope {
        entity: &entity_name,
        table,
        key_columns: &key_columns,
        ctx,
    };
    for spec in &fragment.properties {
        let property = bind_property(mappings, &scope, spec, !spec.not_null)?;
        if !entity.add_property(property) {
            return Err(MappingError::duplicate(
                "property",
                format!("{}.{}", entity_name, spec.name),
            )
            .with_entity(entity_name.clone())
            .into());
        }
    }

    let kind = entity.kind;
    mappings.add_entity(entity)?;
    if let Some(parent) = superclass.as_deref().and_then(|s| mappings.entity_mut(s)) {
        parent.subclasses.push(entity_name.clone());
    }

    mappings.add_import(&entity_name, &entity_name)?;
    if ctx.auto_import {
        mappings.add_import(&entity_name, unqualify(&entity_name))?;
    }

    match kind {
        InheritanceKind::Root => mappings.enqueue_second_pass(
            SecondPass::CreateRootKey {
                entity: entity_name,
            },
            true,
        ),
        InheritanceKind::JoinedSubclass => mappings.enqueue_second_pass(
            SecondPass::CreateJoinedSubclassKey {
                entity: entity_name,
                on_delete: fragment.on_delete,
            },
            true,
        ),
        InheritanceKind::Subclass | InheritanceKind::UnionSubclass => {}
    }
    Ok(())
}

fn resolve_superclass(
    mappings: &Mappings,
    fragment: &EntityFragment,
    entity_name: &str,
    ctx: &DocumentContext,
) -> Result<Option<String>> {
    match (fragment.kind.is_subclass(), fragment.superclass.as_deref()) {
        (false, None) => Ok(None),
        (false, Some(_)) => Err(invalid(
            entity_name,
            format!("root class {} must not declare a superclass", entity_name),
        )),
        (true, None) => Err(invalid(
            entity_name,
            format!("{} {} declares no superclass", fragment.kind.label(), entity_name),
        )),
        (true, Some(superclass)) => match mappings.resolve_class(superclass, ctx.package()) {
            Some(resolved) => Ok(Some(resolved)),
            None => Err(MappingError::unresolved_superclasses(vec![UnresolvedSuperclass {
                name: superclass.to_string(),
                package: ctx.package.clone(),
            }])
            .with_entity(entity_name)
            .into()),
        },
    }
}

fn bind_identifier(
    mappings: &mut Mappings,
    entity_name: &str,
    table: TableId,
    spec: &IdentifierSpec,
    ctx: &DocumentContext,
) -> Result<IdentifierMapping> {
    let value = if spec.parts.is_empty() {
        let logical = match (&spec.name, spec.columns.is_empty()) {
            (_, false) => spec.columns.clone(),
            (Some(name), true) => vec![name.clone()],
            (None, true) => {
                return Err(invalid(
                    entity_name,
                    format!("identifier of {} maps no columns", entity_name),
                ));
            }
        };
        let columns = bind_columns(
            mappings,
            table,
            &logical,
            spec.type_name.as_deref(),
            false,
            false,
        )?;
        ValueMapping::basic(columns, spec.type_name.clone()).nullable(false)
    } else {
        let scope = PropertyScope {
            entity: entity_name,
            table,
            key_columns: &[],
            ctx,
        };
        let parts = spec
            .parts
            .iter()
            .map(|part| bind_property(mappings, &scope, part, false))
            .collect::<Result<Vec<_>>>()?;
        ValueMapping::component(parts).nullable(false)
    };
    Ok(IdentifierMapping {
        property_name: spec.name.clone(),
        value,
        generator: spec.generator.clone(),
    })
}

/// Where a property is being bound.
struct PropertyScope<'a> {
    entity: &'a str,
    table: TableId,
    /// Columns a constrained one-to-one refers from.
    key_columns: &'a [String],
    ctx: &'a DocumentContext,
}

fn bind_property(
    mappings: &mut Mappings,
    scope: &PropertyScope<'_>,
    spec: &PropertySpec,
    nullable: bool,
) -> Result<PropertyMapping> {
    let value = match &spec.kind {
        PropertyKind::Basic { columns, type_name } => {
            let logical = columns_or_name(columns, &spec.name);
            let columns = bind_columns(
                mappings,
                scope.table,
                &logical,
                type_name.as_deref(),
                nullable,
                spec.unique,
            )?;
            ValueMapping::basic(columns, type_name.clone()).nullable(nullable)
        }
        PropertyKind::ManyToOne {
            entity,
            columns,
            property_ref,
            foreign_key,
            on_delete,
        } => {
            let target = entity.as_deref().map(|e| scope.ctx.qualify(e));
            let logical = columns_or_name(columns, &spec.name);
            let columns =
                bind_columns(mappings, scope.table, &logical, None, nullable, spec.unique)?;
            match (property_ref, &target) {
                (Some(property_ref), Some(target)) => {
                    mappings.add_unique_property_reference(target, property_ref);
                    mappings.enqueue_second_pass(
                        SecondPass::PropertyRefConstraint {
                            entity: scope.entity.to_string(),
                            property: spec.name.clone(),
                            referenced_entity: target.clone(),
                            property_ref: property_ref.clone(),
                        },
                        false,
                    );
                }
                _ => mappings.table_mut(scope.table).add_association(PendingAssociation {
                    name: foreign_key.clone(),
                    columns: columns.clone(),
                    referenced_entity: target.clone(),
                    on_delete: *on_delete,
                }),
            }
            ValueMapping::new(
                ValueKind::ManyToOne {
                    entity: target,
                    property_ref: property_ref.clone(),
                },
                columns,
            )
            .nullable(nullable)
        }
        PropertyKind::OneToOne {
            entity,
            property_ref,
            constrained,
        } => {
            let target = entity.as_deref().map(|e| scope.ctx.qualify(e));
            if let (Some(property_ref), Some(target)) = (property_ref, &target) {
                mappings.add_unique_property_reference(target, property_ref);
            }
            if *constrained {
                mappings.table_mut(scope.table).add_association(PendingAssociation {
                    name: None,
                    columns: scope.key_columns.to_vec(),
                    referenced_entity: target.clone(),
                    on_delete: ReferentialAction::NoAction,
                });
            }
            ValueMapping::new(
                ValueKind::OneToOne {
                    entity: target,
                    property_ref: property_ref.clone(),
                },
                Vec::new(),
            )
        }
        PropertyKind::Component { properties } => {
            let mut parts: Vec<PropertyMapping> = Vec::with_capacity(properties.len());
            for part in properties {
                let bound = bind_property(mappings, scope, part, nullable && !part.not_null)?;
                if parts.iter().any(|p| p.name == bound.name) {
                    return Err(MappingError::duplicate(
                        "property",
                        format!("{}.{}.{}", scope.entity, spec.name, part.name),
                    )
                    .with_entity(scope.entity)
                    .into());
                }
                parts.push(bound);
            }
            ValueMapping::component(parts).nullable(nullable)
        }
    };
    Ok(PropertyMapping::new(spec.name.clone(), value).unique(spec.unique))
}

fn columns_or_name(columns: &[String], name: &str) -> Vec<String> {
    if columns.is_empty() {
        vec![name.to_string()]
    } else {
        columns.to_vec()
    }
}

fn invalid(entity: &str, message: String) -> ormbind_core::Error {
    MappingError::new(MappingErrorKind::InvalidFragment, message)
        .with_entity(entity)
        .into()
}

fn unmapped(entity: &str) -> ormbind_core::Error {
    MappingError::new(
        MappingErrorKind::UnmappedClass,
        format!("unmapped class: {}", entity),
    )
    .with_entity(entity)
    .into()
}

/// Primary key of a root entity's table from its identifier columns.
pub fn create_root_key(mappings: &mut Mappings, entity: &str) -> Result<()> {
    let Some(root) = mappings.entity(entity) else {
        return Err(unmapped(entity));
    };
    let table = root.table;
    let columns = root
        .identifier
        .as_ref()
        .map(|id| id.columns().to_vec())
        .unwrap_or_default();
    if mappings.table_mut(table).create_primary_key(&columns) {
        tracing::debug!(entity, columns = ?columns, "Created root primary key");
    }
    Ok(())
}

/// Primary key of a joined subclass table, and the foreign key from it to
/// the superclass.
pub fn create_joined_subclass_key(
    mappings: &mut Mappings,
    entity: &str,
    on_delete: ReferentialAction,
) -> Result<()> {
    let Some(subclass) = mappings.entity(entity) else {
        return Err(unmapped(entity));
    };
    let Some(superclass) = subclass.superclass.clone() else {
        return Err(MappingError::new(
            MappingErrorKind::InvalidState,
            format!("joined-subclass {} has no superclass", entity),
        )
        .with_entity(entity)
        .into());
    };
    let table = subclass.table;
    let key = subclass.key_columns.clone();

    let table = mappings.table_mut(table);
    table.create_primary_key(&key);
    table.add_association(PendingAssociation {
        name: None,
        columns: key,
        referenced_entity: Some(superclass),
        on_delete,
    });
    tracing::debug!(entity, table = %table.name(), "Created joined-subclass key");
    Ok(())
}

/// Foreign key from a to-one association's columns to the unique property
/// it targets.
pub fn create_property_ref_constraint(
    mappings: &mut Mappings,
    entity: &str,
    property: &str,
    referenced_entity: &str,
    property_ref: &str,
) -> Result<()> {
    let Some(source) = mappings.entity(entity) else {
        return Err(unmapped(entity));
    };
    let table = source.table;
    let Some(columns) = source.find_value(property).map(|v| v.columns.clone()) else {
        return Err(MappingError::new(
            MappingErrorKind::PropertyNotFound,
            format!("property {} not found on entity {}", property, entity),
        )
        .with_entity(entity)
        .into());
    };
    let table_name = mappings.table(table).qualified_name();

    let Some(target) = mappings
        .resolve_entity_name(referenced_entity)
        .map(str::to_string)
    else {
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
    let Some(owner) = mappings.property_owner(&target, property_ref) else {
        return Err(MappingError::new(
            MappingErrorKind::PropertyNotFound,
            format!("property-ref {} not found on entity {}", property_ref, target),
        )
        .with_entity(target)
        .into());
    };
    let target_table = owner.table;
    let target_columns = owner
        .find_value(property_ref)
        .map(|v| v.columns.clone())
        .unwrap_or_default();

    if columns.len() != target_columns.len() {
        return Err(MappingError::new(
            MappingErrorKind::ColumnCountMismatch,
            format!(
                "property-ref {}.{} maps {} columns but {}.{} maps {}",
                entity,
                property,
                columns.len(),
                target,
                property_ref,
                target_columns.len()
            ),
        )
        .with_table(table_name)
        .into());
    }

    mappings.table_mut(target_table).add_unique_key(&target_columns);
    let name = mappings.table(table).foreign_key_name(&columns, Some(&target));
    mappings.add_resolved_foreign_key(ForeignKeyMapping {
        name,
        table,
        columns,
        referenced_entity: Some(target),
        referenced_table: Some(target_table),
        referenced_columns: target_columns,
        on_delete: ReferentialAction::NoAction,
    })
}
