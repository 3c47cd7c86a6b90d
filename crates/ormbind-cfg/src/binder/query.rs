//! Named queries and native-query result-set mappings.
//!
//! Object queries are opaque text and are registered as soon as their
//! document is bound. Result-set mappings and native queries are bound in
//! the query wave, after every collection has been resolved, because their
//! returns may load collections declared by any document.

use crate::mappings::{Mappings, unknown_role};
use ormbind_core::naming::collection_role;
use ormbind_core::{
    MappingError, MappingErrorKind, NamedQueryDefinition, NamedQueryFragment,
    NamedSqlQueryDefinition, NamedSqlQueryFragment, QueryOptions, QueryOptionsSpec, QueryReturn,
    Result, ResultBinding, ResultSetFragment, ResultSetMapping, ReturnSpec,
};
use std::collections::HashMap;

/// Collection-load result keys that name parts of the collection itself.
const COLLECTION_RESULT_KEYS: [&str; 4] = ["key", "index", "id", "element"];

pub(crate) fn query_options(spec: &QueryOptionsSpec) -> QueryOptions {
    QueryOptions {
        cacheable: spec.cacheable,
        cache_region: spec.cache_region.clone(),
        timeout: spec.timeout,
        fetch_size: spec.fetch_size,
        read_only: spec.read_only,
        comment: spec.comment.clone(),
        parameter_types: spec.parameter_types.clone(),
    }
}

fn check_name(kind: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(MappingError::new(
            MappingErrorKind::InvalidFragment,
            format!("{} name must not be empty", kind),
        )
        .into());
    }
    Ok(())
}

pub fn bind_named_query(mappings: &mut Mappings, fragment: &NamedQueryFragment) -> Result<()> {
    check_name("query", &fragment.name)?;
    mappings.add_query(NamedQueryDefinition {
        name: fragment.name.clone(),
        query: fragment.query.clone(),
        options: query_options(&fragment.options),
    })?;
    tracing::debug!(name = %fragment.name, "Bound named query");
    Ok(())
}

pub fn bind_result_set_mapping(
    mappings: &mut Mappings,
    fragment: &ResultSetFragment,
    package: Option<&str>,
) -> Result<()> {
    check_name("result set", &fragment.name)?;
    let returns = bind_returns(mappings, &fragment.returns, package)?;
    mappings.add_result_set_mapping(ResultSetMapping {
        name: fragment.name.clone(),
        returns,
    })?;
    tracing::debug!(name = %fragment.name, "Bound result set mapping");
    Ok(())
}

pub fn bind_named_sql_query(
    mappings: &mut Mappings,
    fragment: &NamedSqlQueryFragment,
    package: Option<&str>,
) -> Result<()> {
    check_name("query", &fragment.name)?;
    let result = match &fragment.result_set_ref {
        Some(reference) => {
            if mappings.result_set_mapping(reference).is_none() {
                return Err(MappingError::new(
                    MappingErrorKind::UnknownResultSetMapping,
                    format!("Unable to find resultset-ref definition: {}", reference),
                )
                .into());
            }
            ResultBinding::Reference(reference.clone())
        }
        None => ResultBinding::Inline(ResultSetMapping {
            name: fragment.name.clone(),
            returns: bind_returns(mappings, &fragment.returns, package)?,
        }),
    };

    mappings.add_sql_query(NamedSqlQueryDefinition {
        name: fragment.name.clone(),
        sql: fragment.sql.clone(),
        result,
        synchronized_tables: fragment.synchronized_tables.clone(),
        callable: fragment.callable,
        options: query_options(&fragment.options),
    })?;
    tracing::debug!(name = %fragment.name, "Bound named SQL query");
    Ok(())
}

fn invalid(message: String) -> ormbind_core::Error {
    MappingError::new(MappingErrorKind::InvalidFragment, message).into()
}

/// Resolve declared returns against the mapped model.
fn bind_returns(
    mappings: &Mappings,
    specs: &[ReturnSpec],
    package: Option<&str>,
) -> Result<Vec<QueryReturn>> {
    // alias -> entity rows of that alias are instances of, if any
    let mut aliases: HashMap<String, Option<String>> = HashMap::new();
    let mut returns = Vec::with_capacity(specs.len());

    for spec in specs {
        let bound = match spec {
            ReturnSpec::Root {
                alias,
                entity,
                property_results,
            } => {
                let Some(resolved) = mappings.resolve_class(entity, package) else {
                    return Err(MappingError::new(
                        MappingErrorKind::UnmappedClass,
                        format!("return alias {} refers to an unmapped class: {}", alias, entity),
                    )
                    .with_entity(entity.clone())
                    .into());
                };
                for property in property_results.keys() {
                    if property != "class"
                        && mappings.referenced_property(&resolved, property).is_none()
                    {
                        return Err(property_not_found(&resolved, property));
                    }
                }
                register_alias(&mut aliases, alias, Some(resolved.clone()))?;
                QueryReturn::Root {
                    alias: alias.clone(),
                    entity: resolved,
                    property_results: property_results.clone(),
                }
            }
            ReturnSpec::Join { alias, property } => {
                let Some((owner_alias, path)) = property.split_once('.') else {
                    return Err(invalid(format!(
                        "return-join {} must name its property as ownerAlias.property, found '{}'",
                        alias, property
                    )));
                };
                let Some(owner_entity) = aliases.get(owner_alias) else {
                    return Err(invalid(format!(
                        "return-join {} refers to unknown alias {}",
                        alias, owner_alias
                    )));
                };
                let Some(owner_entity) = owner_entity.clone() else {
                    return Err(invalid(format!(
                        "alias {} has no entity to join {} from",
                        owner_alias, path
                    )));
                };
                let Some(value) = mappings.referenced_property(&owner_entity, path) else {
                    return Err(property_not_found(&owner_entity, path));
                };

                let (target, is_collection, joined_entity) =
                    if let Some(role) = value.collection_role() {
                        let element = mappings
                            .collection(role)
                            .and_then(|c| c.element.referenced_entity())
                            .and_then(|e| mappings.resolve_entity_name(e))
                            .map(str::to_string);
                        (role.to_string(), true, element)
                    } else if let Some(entity) = value.associated_entity() {
                        let resolved = mappings
                            .resolve_entity_name(entity)
                            .map_or_else(|| entity.to_string(), str::to_string);
                        (resolved.clone(), false, Some(resolved))
                    } else {
                        return Err(invalid(format!(
                            "property {}.{} joined by alias {} is not an association",
                            owner_entity, path, alias
                        )));
                    };

                register_alias(&mut aliases, alias, joined_entity)?;
                QueryReturn::Join {
                    alias: alias.clone(),
                    owner_alias: owner_alias.to_string(),
                    property: path.to_string(),
                    target,
                    is_collection,
                }
            }
            ReturnSpec::CollectionLoad {
                alias,
                role,
                property_results,
            } => {
                let resolved_role = resolve_role(mappings, role, package)?;
                let Some(collection) = mappings.collection(&resolved_role) else {
                    return Err(unknown_role(role).into());
                };
                let Some(table) = collection.table.filter(|_| collection.is_bound()) else {
                    return Err(MappingError::new(
                        MappingErrorKind::InvalidState,
                        format!("collection {} loaded by alias {} is not bound yet", resolved_role, alias),
                    )
                    .with_role(resolved_role)
                    .into());
                };
                let element_entity = collection
                    .element
                    .referenced_entity()
                    .and_then(|e| mappings.resolve_entity_name(e))
                    .map(str::to_string);

                for key in property_results.keys() {
                    check_collection_result_key(mappings, &resolved_role, element_entity.as_deref(), key)?;
                }

                register_alias(&mut aliases, alias, element_entity)?;
                QueryReturn::CollectionLoad {
                    alias: alias.clone(),
                    role: resolved_role,
                    table,
                    property_results: property_results.clone(),
                }
            }
            ReturnSpec::Scalar { column, type_name } => QueryReturn::Scalar {
                column: column.clone(),
                type_name: type_name.clone(),
            },
        };
        returns.push(bound);
    }
    Ok(returns)
}

fn register_alias(
    aliases: &mut HashMap<String, Option<String>>,
    alias: &str,
    entity: Option<String>,
) -> Result<()> {
    if aliases.insert(alias.to_string(), entity).is_some() {
        return Err(invalid(format!("duplicate return alias {}", alias)));
    }
    Ok(())
}

fn property_not_found(entity: &str, property: &str) -> ormbind_core::Error {
    MappingError::new(
        MappingErrorKind::PropertyNotFound,
        format!("property {} not found on entity {}", property, entity),
    )
    .with_entity(entity)
    .into()
}

/// A role as written in a document: as-is, or with its owner qualified by
/// the document package or resolved through an import.
fn resolve_role(mappings: &Mappings, role: &str, package: Option<&str>) -> Result<String> {
    if mappings.collection(role).is_some() {
        return Ok(role.to_string());
    }
    let resolved = role.rsplit_once('.').and_then(|(owner, property)| {
        mappings
            .resolve_class(owner, package)
            .map(|entity| collection_role(&entity, property))
    });
    match resolved {
        Some(resolved) if mappings.collection(&resolved).is_some() => Ok(resolved),
        _ => Err(unknown_role(role).into()),
    }
}

fn check_collection_result_key(
    mappings: &Mappings,
    role: &str,
    element_entity: Option<&str>,
    key: &str,
) -> Result<()> {
    if COLLECTION_RESULT_KEYS.contains(&key) {
        return Ok(());
    }
    let Some(path) = key.strip_prefix("element.") else {
        return Err(MappingError::new(
            MappingErrorKind::PropertyNotFound,
            format!("collection result property {} is not key, index, id or element", key),
        )
        .with_role(role)
        .into());
    };
    match element_entity {
        Some(entity) if mappings.referenced_property(entity, path).is_some() => Ok(()),
        Some(entity) => Err(property_not_found(entity, path)),
        None => Err(MappingError::new(
            MappingErrorKind::PropertyNotFound,
            format!("collection {} has no entity elements to map {} onto", role, key),
        )
        .with_role(role)
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::bind_document;
    use crate::config::MappingConfig;
    use crate::second_pass::run_second_passes;
    use ormbind_core::{
        CollectionFragment, EntityFragment, IdentifierSpec, KeySpec, MappingDocument,
        PropertySpec,
    };
    use std::collections::BTreeMap;

    fn zoo() -> MappingDocument {
        MappingDocument::new()
            .with_package("org.zoo")
            .entity(
                EntityFragment::root("Keeper", IdentifierSpec::simple("id", "KEEPER_ID"))
                    .property(PropertySpec::basic("name", "NAME")),
            )
            .entity(
                EntityFragment::root("Cat", IdentifierSpec::simple("id", "CAT_ID"))
                    .property(PropertySpec::basic("name", "NAME"))
                    .property(PropertySpec::many_to_one("keeper", "Keeper", "KEEPER_ID")),
            )
            .collection(CollectionFragment::one_to_many(
                "Cat",
                "kittens",
                "Cat",
                KeySpec::columns(&["MOTHER_ID"]),
            ))
    }

    fn root(alias: &str, entity: &str) -> ReturnSpec {
        ReturnSpec::Root {
            alias: alias.to_string(),
            entity: entity.to_string(),
            property_results: BTreeMap::new(),
        }
    }

    fn join(alias: &str, property: &str) -> ReturnSpec {
        ReturnSpec::Join {
            alias: alias.to_string(),
            property: property.to_string(),
        }
    }

    fn bound(document: MappingDocument) -> Result<Mappings> {
        let mut m = Mappings::new(MappingConfig::default());
        bind_document(&mut m, document)?;
        run_second_passes(&mut m)?;
        Ok(m)
    }

    #[test]
    fn inline_returns_resolve_roots_joins_and_scalars() {
        let document = zoo().sql_query(
            NamedSqlQueryFragment::new("catsWithKeepers", "select ...")
                .returning(root("cat", "Cat"))
                .returning(join("keeper", "cat.keeper"))
                .returning(join("kitten", "cat.kittens"))
                .returning(ReturnSpec::Scalar {
                    column: "total".to_string(),
                    type_name: Some("long".to_string()),
                }),
        );
        let m = bound(document).unwrap();

        let query = m.sql_query("catsWithKeepers").unwrap();
        let ResultBinding::Inline(mapping) = &query.result else {
            panic!("expected inline returns");
        };
        assert_eq!(mapping.returns.len(), 4);
        assert!(matches!(
            mapping.alias("cat"),
            Some(QueryReturn::Root { entity, .. }) if entity == "org.zoo.Cat"
        ));
        assert!(matches!(
            mapping.alias("keeper"),
            Some(QueryReturn::Join { target, is_collection: false, .. }) if target == "org.zoo.Keeper"
        ));
        assert!(matches!(
            mapping.alias("kitten"),
            Some(QueryReturn::Join { target, is_collection: true, .. }) if target == "org.zoo.Cat.kittens"
        ));
    }

    #[test]
    fn collection_load_accepts_package_relative_role() {
        let mut load_results = BTreeMap::new();
        load_results.insert("key".to_string(), vec!["MOTHER_ID".to_string()]);
        load_results.insert("element.name".to_string(), vec!["NAME".to_string()]);
        let document = zoo().sql_query(
            NamedSqlQueryFragment::new("kittens", "select ...").returning(
                ReturnSpec::CollectionLoad {
                    alias: "k".to_string(),
                    role: "Cat.kittens".to_string(),
                    property_results: load_results,
                },
            ),
        );
        let m = bound(document).unwrap();

        let query = m.sql_query("kittens").unwrap();
        let ResultBinding::Inline(mapping) = &query.result else {
            panic!("expected inline returns");
        };
        let cat_table = m.entity("org.zoo.Cat").unwrap().table;
        assert!(matches!(
            mapping.alias("k"),
            Some(QueryReturn::CollectionLoad { role, table, .. })
                if role == "org.zoo.Cat.kittens" && *table == cat_table
        ));
    }

    #[test]
    fn result_set_ref_declared_by_the_same_document_resolves() {
        let document = zoo()
            .sql_query(NamedSqlQueryFragment::new("allCats", "select ...").result_set_ref("cats"))
            .result_set(ResultSetFragment {
                name: "cats".to_string(),
                returns: vec![root("cat", "Cat")],
            });
        let m = bound(document).unwrap();

        assert_eq!(m.sql_query("allCats").unwrap().result_set_ref(), Some("cats"));
        assert!(m.result_set_mapping("cats").is_some());
    }

    #[test]
    fn missing_result_set_ref_fails() {
        let document = zoo()
            .sql_query(NamedSqlQueryFragment::new("allCats", "select ...").result_set_ref("dogs"));
        let err = bound(document).unwrap_err();
        assert!(err.is_mapping_kind(MappingErrorKind::UnknownResultSetMapping));
        assert!(err.to_string().contains("Unable to find resultset-ref definition: dogs"));
    }

    #[test]
    fn malformed_returns_are_rejected() {
        let duplicate_alias = zoo().sql_query(
            NamedSqlQueryFragment::new("q", "select ...")
                .returning(root("cat", "Cat"))
                .returning(root("cat", "Keeper")),
        );
        assert!(bound(duplicate_alias)
            .unwrap_err()
            .is_mapping_kind(MappingErrorKind::InvalidFragment));

        let unknown_owner = zoo().sql_query(
            NamedSqlQueryFragment::new("q", "select ...").returning(join("keeper", "dog.keeper")),
        );
        assert!(bound(unknown_owner)
            .unwrap_err()
            .is_mapping_kind(MappingErrorKind::InvalidFragment));

        let not_association = zoo().sql_query(
            NamedSqlQueryFragment::new("q", "select ...")
                .returning(root("cat", "Cat"))
                .returning(join("n", "cat.name")),
        );
        assert!(bound(not_association)
            .unwrap_err()
            .is_mapping_kind(MappingErrorKind::InvalidFragment));

        let unmapped = zoo()
            .sql_query(NamedSqlQueryFragment::new("q", "select ...").returning(root("d", "Dog")));
        assert!(bound(unmapped)
            .unwrap_err()
            .is_mapping_kind(MappingErrorKind::UnmappedClass));
    }

    #[test]
    fn unknown_root_property_result_fails() {
        let mut results = BTreeMap::new();
        results.insert("whiskers".to_string(), vec!["W".to_string()]);
        let document = zoo().sql_query(NamedSqlQueryFragment::new("q", "select ...").returning(
            ReturnSpec::Root {
                alias: "cat".to_string(),
                entity: "Cat".to_string(),
                property_results: results,
            },
        ));
        let err = bound(document).unwrap_err();
        assert!(err.is_mapping_kind(MappingErrorKind::PropertyNotFound));
    }

    #[test]
    fn query_names_share_one_namespace() {
        let document = zoo()
            .query(NamedQueryFragment::new("cats", "from Cat"))
            .sql_query(NamedSqlQueryFragment::new("cats", "select ...").returning(root("c", "Cat")));
        let err = bound(document).unwrap_err();
        assert!(err.is_duplicate());
    }

    #[test]
    fn named_query_options_are_carried() {
        let mut fragment = NamedQueryFragment::new("cachedCats", "from Cat");
        fragment.options.cacheable = true;
        fragment.options.timeout = Some(30);
        let mut m = Mappings::new(MappingConfig::default());
        bind_named_query(&mut m, &fragment).unwrap();

        let query = m.query("cachedCats").unwrap();
        assert!(query.options.cacheable);
        assert_eq!(query.options.timeout, Some(30));

        let err = bind_named_query(&mut m, &NamedQueryFragment::new(" ", "from Cat")).unwrap_err();
        assert!(err.is_mapping_kind(MappingErrorKind::InvalidFragment));
    }
}
