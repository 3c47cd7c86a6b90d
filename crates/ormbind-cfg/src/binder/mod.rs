//! Document binding.
//!
//! Binding turns a [`MappingDocument`] into repository content. Everything
//! that can be bound from the document alone is bound immediately; whatever
//! depends on other documents is deferred as a second pass. A document
//! whose entities extend a class that is not mapped yet is parked on the
//! extends queue and bound as a whole later.

pub mod collection;
pub mod entity;
pub mod query;

use crate::extends::ExtendsQueueEntry;
use crate::mappings::Mappings;
use crate::second_pass::SecondPass;
use ormbind_core::naming::{collection_role, is_valid_entity_name, qualify_class_name, unqualify};
use ormbind_core::{
    Column, InheritanceKind, MappingDocument, MappingError, MappingErrorKind, Result, TableId,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Document-level settings shared by every fragment of a document.
#[derive(Debug, Clone)]
pub struct DocumentContext {
    pub package: Option<String>,
    pub auto_import: bool,
    pub metas: BTreeMap<String, String>,
}

impl DocumentContext {
    pub fn package(&self) -> Option<&str> {
        self.package.as_deref()
    }

    pub fn qualify(&self, name: &str) -> String {
        qualify_class_name(name, self.package())
    }
}

/// Bind one document, or park it on the extends queue under every class its
/// entities extend that is not mapped yet.
#[tracing::instrument(level = "debug", skip(mappings, document), fields(package = ?document.package))]
pub fn bind_document(mappings: &mut Mappings, document: MappingDocument) -> Result<()> {
    validate_document(mappings, &document)?;
    let package = document_package(mappings, &document);

    let missing = missing_superclasses(mappings, &document, package.as_deref());
    if !missing.is_empty() {
        let document = Arc::new(document);
        for name in missing {
            mappings.enqueue_extends_entry(ExtendsQueueEntry::new(
                name,
                package.clone(),
                Arc::clone(&document),
            ));
        }
        return Ok(());
    }

    let ctx = DocumentContext {
        auto_import: document
            .auto_import
            .unwrap_or(mappings.config().auto_import),
        package,
        metas: document.metas,
    };

    for import in &document.imports {
        let class = ctx.qualify(&import.class);
        let rename = import
            .rename
            .clone()
            .unwrap_or_else(|| unqualify(&class).to_string());
        mappings.add_import(&class, &rename)?;
    }

    for named_query in &document.queries {
        query::bind_named_query(mappings, named_query)?;
    }

    entity::bind_entities(mappings, &document.entities, &ctx)?;

    for fragment in document.collections {
        collection::register_collection(mappings, fragment, &ctx)?;
    }

    // Named result sets run ahead of the native queries that reference them.
    for fragment in document.result_sets {
        mappings.enqueue_second_pass(
            SecondPass::BindResultSetMapping {
                fragment,
                package: ctx.package.clone(),
            },
            true,
        );
    }
    for fragment in document.sql_queries {
        mappings.enqueue_second_pass(
            SecondPass::BindNamedSqlQuery {
                fragment,
                package: ctx.package.clone(),
            },
            false,
        );
    }

    tracing::debug!(
        entities = mappings.entity_count(),
        pending = mappings.pending_second_passes(),
        "Document bound"
    );
    Ok(())
}

fn document_package(mappings: &Mappings, document: &MappingDocument) -> Option<String> {
    document
        .package
        .clone()
        .or_else(|| mappings.config().default_package.clone())
}

/// Check everything about a document that can be decided without binding
/// it: entity shapes, and names that would clash with each other or with
/// what is already mapped. Nothing is registered.
pub fn validate_document(mappings: &Mappings, document: &MappingDocument) -> Result<()> {
    let package = document_package(mappings, document);
    let package = package.as_deref();

    let mut entity_names: HashSet<String> = HashSet::new();
    for fragment in &document.entities {
        let name = qualify_class_name(&fragment.name, package);
        if !is_valid_entity_name(&name) {
            return Err(invalid_entity(&name, format!("invalid entity name '{}'", name)));
        }
        if mappings.entity(&name).is_some() || !entity_names.insert(name.clone()) {
            return Err(MappingError::duplicate("class/entity", &name)
                .with_entity(name)
                .into());
        }
        match (fragment.kind, fragment.identifier.is_some()) {
            (InheritanceKind::Root, false) => {
                return Err(invalid_entity(
                    &name,
                    format!("entity {} declares no identifier", name),
                ));
            }
            (InheritanceKind::Root, true) | (_, false) => {}
            (_, true) => {
                return Err(invalid_entity(
                    &name,
                    format!("{} {} must not declare an identifier", fragment.kind.label(), name),
                ));
            }
        }
        let mut properties: HashSet<&str> = HashSet::new();
        for property in &fragment.properties {
            if !properties.insert(property.name.as_str()) {
                return Err(MappingError::duplicate(
                    "property",
                    format!("{}.{}", name, property.name),
                )
                .with_entity(name)
                .into());
            }
        }
    }

    let mut roles: HashSet<String> = HashSet::new();
    for fragment in &document.collections {
        let role = collection_role(&qualify_class_name(&fragment.owner, package), &fragment.property);
        if mappings.collection(&role).is_some() || !roles.insert(role.clone()) {
            return Err(MappingError::duplicate("collection role", &role)
                .with_role(role)
                .into());
        }
    }

    let mut query_names: HashSet<&str> = HashSet::new();
    let names = document
        .queries
        .iter()
        .map(|q| q.name.as_str())
        .chain(document.sql_queries.iter().map(|q| q.name.as_str()));
    for name in names {
        mappings.check_query_name(name)?;
        if !query_names.insert(name) {
            return Err(MappingError::duplicate("query", name).into());
        }
    }
    Ok(())
}

fn invalid_entity(entity: &str, message: String) -> ormbind_core::Error {
    MappingError::new(MappingErrorKind::InvalidFragment, message)
        .with_entity(entity)
        .into()
}

/// Superclass names referenced by the document that are neither mapped nor
/// declared by the document itself, in declaration order.
fn missing_superclasses(
    mappings: &Mappings,
    document: &MappingDocument,
    package: Option<&str>,
) -> Vec<String> {
    let declared: HashSet<String> = document
        .entities
        .iter()
        .map(|e| qualify_class_name(&e.name, package))
        .collect();

    let mut missing: Vec<String> = Vec::new();
    for fragment in &document.entities {
        if !fragment.kind.is_subclass() {
            continue;
        }
        let Some(superclass) = fragment.superclass.as_deref() else {
            continue;
        };
        let in_document = declared.contains(superclass)
            || declared.contains(&qualify_class_name(superclass, package));
        if in_document || mappings.resolve_class(superclass, package).is_some() {
            continue;
        }
        if !missing.iter().any(|m| m == superclass) {
            missing.push(superclass.to_string());
        }
    }
    missing
}

/// Register columns on `table` under their logical names and return the
/// physical names.
pub(crate) fn bind_columns(
    mappings: &mut Mappings,
    table: TableId,
    logical_names: &[String],
    type_name: Option<&str>,
    nullable: bool,
    unique: bool,
) -> Result<Vec<String>> {
    let mut physical_names = Vec::with_capacity(logical_names.len());
    for logical in logical_names {
        if logical.trim().is_empty() {
            return Err(MappingError::new(
                MappingErrorKind::InvalidFragment,
                "column names must not be empty",
            )
            .with_table(mappings.table(table).qualified_name())
            .into());
        }
        let physical = mappings.normalize_identifier(logical);
        mappings.table_mut(table).add_column(
            Column::new(physical.clone())
                .type_name(type_name.map(str::to_string))
                .nullable(nullable)
                .unique(unique),
        );
        mappings.add_column_binding(logical, &physical, table)?;
        physical_names.push(physical);
    }
    Ok(physical_names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MappingConfig;
    use ormbind_core::{
        EntityFragment, IdentifierSpec, ImportSpec, NamedQueryFragment, TableIdentity,
    };

    #[test]
    fn documents_needing_a_missing_superclass_are_parked_whole() {
        let mut m = Mappings::new(MappingConfig::default());
        let document = MappingDocument::new()
            .entity(EntityFragment::joined_subclass("Manager", "Employee"))
            .query(NamedQueryFragment::new("managers", "from Manager"));

        bind_document(&mut m, document).unwrap();
        assert_eq!(m.extends_queue().len(), 1);
        assert_eq!(m.extends_queue()[0].explicit_name, "Employee");
        assert!(m.query("managers").is_none());
        assert_eq!(m.entity_count(), 0);
    }

    #[test]
    fn superclass_declared_later_in_the_same_document_is_not_missing() {
        let mut m = Mappings::new(MappingConfig::default());
        let document = MappingDocument::new()
            .entity(EntityFragment::joined_subclass("Manager", "Employee"))
            .entity(EntityFragment::root("Employee", IdentifierSpec::simple("id", "EMP_ID")));

        bind_document(&mut m, document).unwrap();
        assert!(m.extends_queue().is_empty());
        assert_eq!(m.entity_count(), 2);
        assert_eq!(
            m.entity("Employee").unwrap().subclasses,
            vec!["Manager".to_string()]
        );
    }

    #[test]
    fn default_package_and_imports() {
        let mut m = Mappings::new(MappingConfig::default().default_package("org.hr"));
        let document = MappingDocument::new()
            .entity(EntityFragment::root("Employee", IdentifierSpec::simple("id", "EMP_ID")))
            .import(ImportSpec {
                class: "Employee".to_string(),
                rename: Some("Staff".to_string()),
            });

        bind_document(&mut m, document).unwrap();
        assert!(m.entity("org.hr.Employee").is_some());
        assert_eq!(m.resolve_entity_name("Employee"), Some("org.hr.Employee"));
        assert_eq!(m.resolve_entity_name("Staff"), Some("org.hr.Employee"));
    }

    #[test]
    fn auto_import_can_be_disabled_per_document() {
        let mut m = Mappings::new(MappingConfig::default());
        let mut document = MappingDocument::new()
            .with_package("org.hr")
            .entity(EntityFragment::root("Employee", IdentifierSpec::simple("id", "EMP_ID")));
        document.auto_import = Some(false);

        bind_document(&mut m, document).unwrap();
        assert_eq!(m.resolve_entity_name("Employee"), None);
        assert_eq!(
            m.resolve_entity_name("org.hr.Employee"),
            Some("org.hr.Employee")
        );
    }

    #[test]
    fn bind_columns_applies_global_quoting() {
        let mut m = Mappings::new(MappingConfig::default().globally_quoted_identifiers(true));
        let table = m.add_or_get_table(TableIdentity::new("EMPLOYEE"));
        let names = bind_columns(&mut m, table, &["NAME".to_string()], Some("string"), false, false)
            .unwrap();

        assert_eq!(names, vec!["\"NAME\""]);
        assert_eq!(m.table(table).name(), "\"EMPLOYEE\"");
        assert!(!m.table(table).column("\"NAME\"").unwrap().nullable);
        assert_eq!(m.physical_column_name("NAME", table), Some("\"NAME\""));

        let err = bind_columns(&mut m, table, &[" ".to_string()], None, true, false).unwrap_err();
        assert!(err.is_mapping_kind(MappingErrorKind::InvalidFragment));
    }

    #[test]
    fn invalid_documents_are_rejected_before_anything_is_registered() {
        let mut m = Mappings::new(MappingConfig::default());
        let document = MappingDocument::new()
            .entity(
                EntityFragment::root("Account", IdentifierSpec::simple("id", "ACCOUNT_ID"))
                    .property(ormbind_core::PropertySpec::basic("code", "CODE"))
                    .property(
                        ormbind_core::PropertySpec::many_to_one("holder", "Person", "HOLDER_SSN")
                            .property_ref("ssn"),
                    )
                    .property(ormbind_core::PropertySpec::basic("code", "CODE2")),
            )
            .query(NamedQueryFragment::new("accounts", "from Account"));

        let err = bind_document(&mut m, document).unwrap_err();
        assert!(err.is_duplicate());
        assert!(err.to_string().contains("Account.code"));
        assert_eq!(m.table_ids().len(), 0);
        assert_eq!(m.pending_second_passes(), 0);
        assert!(m.property_references().is_empty());
        assert!(m.query("accounts").is_none());
    }

    #[test]
    fn names_repeated_within_a_document_are_duplicates() {
        let m = Mappings::new(MappingConfig::default());
        let twice = MappingDocument::new()
            .entity(EntityFragment::root("Owl", IdentifierSpec::simple("id", "ID")))
            .entity(EntityFragment::root("Owl", IdentifierSpec::simple("id", "ID")));
        assert!(validate_document(&m, &twice).unwrap_err().is_duplicate());

        let queries = MappingDocument::new()
            .query(NamedQueryFragment::new("owls", "from Owl"))
            .query(NamedQueryFragment::new("owls", "from Owl o"));
        assert!(validate_document(&m, &queries).unwrap_err().is_duplicate());

        let no_id = MappingDocument::new().entity(EntityFragment::subclass("Owl", "Bird"));
        validate_document(&m, &no_id).unwrap();
    }
}
