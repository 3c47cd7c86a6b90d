//! The fragment repository.
//!
//! `Mappings` is the single accumulation point for everything bound from
//! mapping documents: entities, collections, tables, imports, named queries,
//! and the pending work (extends queue, second passes, property references)
//! consumed by compilation. It is passed explicitly as `&mut Mappings` to
//! every binder and resolver; nothing about it is global.

use crate::config::MappingConfig;
use crate::extends::ExtendsQueueEntry;
use crate::property_ref::PropertyReference;
use crate::second_pass::SecondPass;
use ormbind_core::naming::{normalize_identifier_quoting, qualify_class_name};
use ormbind_core::{
    CollectionMapping, EntityMapping, ForeignKeyMapping, MappingError, MappingErrorKind,
    NamedQueryDefinition, NamedSqlQueryDefinition, Result, ResultSetMapping, TableId,
    TableIdentity, TableMapping, ValueMapping,
};
use std::collections::{BTreeMap, HashMap};

/// Logical name of a physical table and the table it denormalizes.
#[derive(Debug, Clone)]
struct TableDescription {
    logical_name: String,
    denormalized_supertable: Option<TableId>,
}

#[derive(Debug, Clone, Default)]
struct ColumnNames {
    logical_to_physical: HashMap<String, String>,
    physical_to_logical: HashMap<String, String>,
}

#[derive(Debug)]
pub struct Mappings {
    config: MappingConfig,
    entities: BTreeMap<String, EntityMapping>,
    collections: BTreeMap<String, CollectionMapping>,
    tables: Vec<TableMapping>,
    table_index: HashMap<String, TableId>,
    imports: BTreeMap<String, String>,
    queries: BTreeMap<String, NamedQueryDefinition>,
    sql_queries: BTreeMap<String, NamedSqlQueryDefinition>,
    result_set_mappings: BTreeMap<String, ResultSetMapping>,
    table_names: HashMap<String, TableDescription>,
    column_names: HashMap<TableId, ColumnNames>,
    second_passes: Vec<SecondPass>,
    extends_queue: Vec<ExtendsQueueEntry>,
    property_references: Vec<PropertyReference>,
}

impl Mappings {
    pub fn new(config: MappingConfig) -> Self {
        Self {
            config,
            entities: BTreeMap::new(),
            collections: BTreeMap::new(),
            tables: Vec::new(),
            table_index: HashMap::new(),
            imports: BTreeMap::new(),
            queries: BTreeMap::new(),
            sql_queries: BTreeMap::new(),
            result_set_mappings: BTreeMap::new(),
            table_names: HashMap::new(),
            column_names: HashMap::new(),
            second_passes: Vec::new(),
            extends_queue: Vec::new(),
            property_references: Vec::new(),
        }
    }

    pub fn config(&self) -> &MappingConfig {
        &self.config
    }

    /// Apply the configured quoting policy to a table or column name.
    pub fn normalize_identifier(&self, name: &str) -> String {
        normalize_identifier_quoting(name, self.config.globally_quoted_identifiers)
    }

    // ==================== Entities ====================

    /// Register an entity. Fails with `DuplicateMapping` if the name is
    /// taken; the existing entity is kept.
    pub fn add_entity(&mut self, entity: EntityMapping) -> Result<()> {
        if self.entities.contains_key(&entity.entity_name) {
            return Err(MappingError::duplicate("class/entity", &entity.entity_name)
                .with_entity(entity.entity_name)
                .into());
        }
        tracing::debug!(entity = %entity.entity_name, kind = entity.kind.label(), "Registered entity");
        self.entities.insert(entity.entity_name.clone(), entity);
        Ok(())
    }

    pub fn entity(&self, name: &str) -> Option<&EntityMapping> {
        self.entities.get(name)
    }

    pub fn entity_mut(&mut self, name: &str) -> Option<&mut EntityMapping> {
        self.entities.get_mut(name)
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityMapping> {
        self.entities.values()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Resolve a name through the entity map, then the imports.
    pub fn resolve_entity_name(&self, name: &str) -> Option<&str> {
        if let Some((key, _)) = self.entities.get_key_value(name) {
            return Some(key.as_str());
        }
        self.imports
            .get(name)
            .filter(|target| self.entities.contains_key(target.as_str()))
            .map(String::as_str)
    }

    /// Resolve a class reference as written in a document of `package`:
    /// the name itself first, then the package-qualified name.
    pub fn resolve_class(&self, name: &str, package: Option<&str>) -> Option<String> {
        if let Some(found) = self.resolve_entity_name(name) {
            return Some(found.to_string());
        }
        let qualified = qualify_class_name(name, package);
        self.resolve_entity_name(&qualified).map(str::to_string)
    }

    pub fn locate_entity(&self, name: &str) -> Option<&EntityMapping> {
        self.resolve_entity_name(name)
            .and_then(|resolved| self.entities.get(resolved))
    }

    /// The entity followed by its superclasses, nearest first.
    pub fn superclass_chain(&self, name: &str) -> Vec<&EntityMapping> {
        let mut chain = Vec::new();
        let mut current = self.entities.get(name);
        while let Some(entity) = current {
            if chain.len() > self.entities.len() {
                break;
            }
            chain.push(entity);
            current = entity
                .superclass
                .as_deref()
                .and_then(|s| self.entities.get(s));
        }
        chain
    }

    pub fn root_entity(&self, name: &str) -> Option<&EntityMapping> {
        self.superclass_chain(name).last().copied()
    }

    /// Columns other tables use to refer to rows of this entity: the key
    /// columns of a joined subclass, otherwise the root identifier columns.
    pub fn entity_key_columns(&self, name: &str) -> Vec<String> {
        let chain = self.superclass_chain(name);
        for entity in &chain {
            if entity.is_joined_subclass() && !entity.key_columns.is_empty() {
                return entity.key_columns.clone();
            }
            if let Some(identifier) = &entity.identifier {
                return identifier.columns().to_vec();
            }
        }
        Vec::new()
    }

    /// The entity in the superclass chain that declares `path`.
    pub fn property_owner(&self, entity: &str, path: &str) -> Option<&EntityMapping> {
        self.superclass_chain(entity)
            .into_iter()
            .find(|e| e.find_value(path).is_some())
    }

    /// Look up a (possibly dotted) property on an entity or its superclasses.
    pub fn referenced_property(&self, entity: &str, path: &str) -> Option<&ValueMapping> {
        self.property_owner(entity, path)
            .and_then(|owner| owner.find_value(path))
    }

    pub fn referenced_property_mut(
        &mut self,
        entity: &str,
        path: &str,
    ) -> Option<&mut ValueMapping> {
        let owner = self.property_owner(entity, path)?.entity_name.clone();
        self.entities
            .get_mut(&owner)
            .and_then(|e| e.find_value_mut(path))
    }

    // ==================== Collections ====================

    pub fn add_collection(&mut self, collection: CollectionMapping) -> Result<()> {
        if self.collections.contains_key(&collection.role) {
            return Err(MappingError::duplicate("collection role", &collection.role)
                .with_role(collection.role)
                .into());
        }
        tracing::debug!(role = %collection.role, "Registered collection");
        self.collections.insert(collection.role.clone(), collection);
        Ok(())
    }

    pub fn collection(&self, role: &str) -> Option<&CollectionMapping> {
        self.collections.get(role)
    }

    pub fn collection_mut(&mut self, role: &str) -> Option<&mut CollectionMapping> {
        self.collections.get_mut(role)
    }

    pub fn collections(&self) -> impl Iterator<Item = &CollectionMapping> {
        self.collections.values()
    }

    /// Run `create_all_keys` for a collection against its own table.
    pub fn create_collection_keys(&mut self, role: &str) -> Result<()> {
        let Some(collection) = self.collections.get_mut(role) else {
            return Err(unknown_role(role).into());
        };
        let Some(table) = collection.table else {
            return Err(MappingError::new(
                MappingErrorKind::InvalidState,
                format!("collection {} has no table", role),
            )
            .with_role(role)
            .into());
        };
        let table = &mut self.tables[table.index()];
        collection
            .create_all_keys(table)
            .map_err(|e| e.with_table(table.qualified_name()))?;
        Ok(())
    }

    // ==================== Tables ====================

    /// Return the table registered under `identity`, creating it first if
    /// needed.
    pub fn add_or_get_table(&mut self, identity: TableIdentity) -> TableId {
        self.add_table(identity, None, false)
    }

    /// Register a table. A subselect table is keyed by its subselect text.
    /// Registering a concrete table over an abstract one makes it concrete.
    pub fn add_table(
        &mut self,
        identity: TableIdentity,
        subselect: Option<String>,
        is_abstract: bool,
    ) -> TableId {
        let identity = self.normalize_table_identity(identity);
        let key = subselect.clone().unwrap_or_else(|| identity.qualified());
        if let Some(&existing) = self.table_index.get(&key) {
            let table = &mut self.tables[existing.index()];
            if table.is_abstract {
                table.is_abstract = is_abstract;
            }
            return existing;
        }
        let id = TableId::new(self.tables.len());
        let mut table = TableMapping::new(id, identity);
        table.subselect = subselect;
        table.is_abstract = is_abstract;
        tracing::debug!(table = %key, id = %id, "Registered table");
        self.tables.push(table);
        self.table_index.insert(key, id);
        id
    }

    /// Register a table that includes the columns and key of `included`.
    /// Fails with `DuplicateMapping` if the identity already exists.
    pub fn add_denormalized_table(
        &mut self,
        identity: TableIdentity,
        included: TableId,
    ) -> Result<TableId> {
        let identity = self.normalize_table_identity(identity);
        let key = identity.qualified();
        if self.table_index.contains_key(&key) {
            return Err(MappingError::duplicate("table", &key).with_table(key).into());
        }
        let id = TableId::new(self.tables.len());
        let mut table = TableMapping::new(id, identity);
        table.included_table = Some(included);
        tracing::debug!(table = %key, included = %included, "Registered denormalized table");
        self.tables.push(table);
        self.table_index.insert(key, id);
        Ok(id)
    }

    fn normalize_table_identity(&self, identity: TableIdentity) -> TableIdentity {
        TableIdentity {
            catalog: identity.catalog.map(|c| self.normalize_identifier(&c)),
            schema: identity.schema.map(|s| self.normalize_identifier(&s)),
            name: self.normalize_identifier(&identity.name),
        }
    }

    /// # Panics
    ///
    /// Panics if `id` was not issued by this repository.
    pub fn table(&self, id: TableId) -> &TableMapping {
        &self.tables[id.index()]
    }

    /// # Panics
    ///
    /// Panics if `id` was not issued by this repository.
    pub fn table_mut(&mut self, id: TableId) -> &mut TableMapping {
        &mut self.tables[id.index()]
    }

    pub fn table_id(&self, identity: &TableIdentity) -> Option<TableId> {
        let identity = self.normalize_table_identity(identity.clone());
        self.table_index.get(&identity.qualified()).copied()
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableMapping> {
        self.tables.iter()
    }

    pub fn table_ids(&self) -> Vec<TableId> {
        (0..self.tables.len()).map(TableId::new).collect()
    }

    /// Primary key columns of a table, following denormalized tables to the
    /// table whose key they include.
    pub fn primary_key_columns(&self, id: TableId) -> Vec<String> {
        let mut current = id;
        for _ in 0..=self.tables.len() {
            let table = self.table(current);
            if let Some(pk) = &table.primary_key {
                return pk.columns.clone();
            }
            match table.included_table {
                Some(included) => current = included,
                None => break,
            }
        }
        Vec::new()
    }

    /// Follow resolved foreign keys over primary key columns (joined
    /// subclass links) up to the table that holds the root key. Where a
    /// joined subclass lives on the table, only the key to its superclass
    /// counts; a constrained one-to-one on the same columns does not.
    pub fn key_owner_table(&self, id: TableId) -> TableId {
        let mut current = id;
        for _ in 0..=self.tables.len() {
            let table = self.table(current);
            let key = self.primary_key_columns(current);
            let superclass = self
                .entities()
                .find(|e| e.table == current && e.is_joined_subclass())
                .and_then(|e| e.superclass.clone());
            let next = table.foreign_keys.iter().find_map(|fk| {
                let links_superclass =
                    superclass.is_none() || fk.referenced_entity == superclass;
                fk.referenced_table.filter(|target| {
                    *target != current && !key.is_empty() && fk.columns == key && links_superclass
                })
            });
            match next {
                Some(target) => current = target,
                None => break,
            }
        }
        current
    }

    /// Attach a foreign key whose target is already known.
    pub fn add_resolved_foreign_key(&mut self, fk: ForeignKeyMapping) -> Result<()> {
        let table = fk.table;
        self.table_mut(table).add_resolved_foreign_key(fk)?;
        Ok(())
    }

    // ==================== Logical names ====================

    /// Bind a logical table name to a physical table. Two logical names for
    /// one physical table is a `DuplicateMapping`.
    pub fn add_table_binding(
        &mut self,
        logical_name: &str,
        table: TableId,
        denormalized_supertable: Option<TableId>,
    ) -> Result<()> {
        let physical = self.table(table).qualified_name();
        if let Some(existing) = self.table_names.get(&physical) {
            if existing.logical_name != logical_name {
                return Err(MappingError::new(
                    MappingErrorKind::DuplicateMapping,
                    format!(
                        "Same physical table name [{}] references several logical table names: [{}], [{}]",
                        physical, existing.logical_name, logical_name
                    ),
                )
                .with_table(physical)
                .into());
            }
            return Ok(());
        }
        self.table_names.insert(
            physical,
            TableDescription {
                logical_name: logical_name.to_string(),
                denormalized_supertable,
            },
        );
        Ok(())
    }

    pub fn logical_table_name(&self, table: TableId) -> Option<&str> {
        self.table_names
            .get(&self.table(table).qualified_name())
            .map(|d| d.logical_name.as_str())
    }

    /// Bind a logical column name to a physical column of `table`.
    pub fn add_column_binding(
        &mut self,
        logical_name: &str,
        physical_name: &str,
        table: TableId,
    ) -> Result<()> {
        let table_name = self.table(table).qualified_name();
        let names = self.column_names.entry(table).or_default();

        if let Some(existing) = names.logical_to_physical.get(logical_name) {
            if existing != physical_name {
                return Err(MappingError::new(
                    MappingErrorKind::DuplicateMapping,
                    format!(
                        "Table [{}] contains logical column name [{}] referenced by multiple physical column names: [{}], [{}]",
                        table_name, logical_name, existing, physical_name
                    ),
                )
                .with_table(table_name)
                .into());
            }
        }
        if let Some(existing) = names.physical_to_logical.get(physical_name) {
            if existing != logical_name {
                return Err(MappingError::new(
                    MappingErrorKind::DuplicateMapping,
                    format!(
                        "Same physical column represented by different logical column names: [{}] => [{}] and [{}]",
                        physical_name, existing, logical_name
                    ),
                )
                .with_table(table_name)
                .into());
            }
        }
        names
            .logical_to_physical
            .insert(logical_name.to_string(), physical_name.to_string());
        names
            .physical_to_logical
            .insert(physical_name.to_string(), logical_name.to_string());
        Ok(())
    }

    /// Physical name of a logical column, searching denormalized
    /// supertables when the table itself does not bind it.
    pub fn physical_column_name(&self, logical_name: &str, table: TableId) -> Option<&str> {
        self.walk_column_names(table, |names| names.logical_to_physical.get(logical_name))
    }

    pub fn logical_column_name(&self, physical_name: &str, table: TableId) -> Option<&str> {
        self.walk_column_names(table, |names| names.physical_to_logical.get(physical_name))
    }

    fn walk_column_names<'a>(
        &'a self,
        table: TableId,
        lookup: impl Fn(&'a ColumnNames) -> Option<&'a String>,
    ) -> Option<&'a str> {
        let mut current = Some(table);
        let mut steps = 0;
        while let Some(id) = current {
            if let Some(found) = self.column_names.get(&id).and_then(&lookup) {
                return Some(found.as_str());
            }
            steps += 1;
            if steps > self.tables.len() {
                break;
            }
            current = self
                .table_names
                .get(&self.table(id).qualified_name())
                .and_then(|d| d.denormalized_supertable)
                .or(self.table(id).included_table);
        }
        None
    }

    // ==================== Imports ====================

    /// Register `rename` as an alias of `entity_name`. Re-importing the same
    /// pair is tolerated; pointing an alias at a second entity is not.
    pub fn add_import(&mut self, entity_name: &str, rename: &str) -> Result<()> {
        match self.imports.get(rename) {
            Some(existing) if existing == entity_name => {
                tracing::info!(import = rename, entity = entity_name, "Duplicate import");
                Ok(())
            }
            Some(existing) => Err(MappingError::new(
                MappingErrorKind::DuplicateMapping,
                format!(
                    "duplicate import: {} refers to both {} and {} (try using auto-import=\"false\")",
                    rename, entity_name, existing
                ),
            )
            .with_entity(entity_name)
            .into()),
            None => {
                self.imports
                    .insert(rename.to_string(), entity_name.to_string());
                Ok(())
            }
        }
    }

    pub fn imports(&self) -> &BTreeMap<String, String> {
        &self.imports
    }

    // ==================== Named queries ====================

    /// Object and native named queries share one namespace.
    pub(crate) fn check_query_name(&self, name: &str) -> Result<()> {
        if self.queries.contains_key(name) || self.sql_queries.contains_key(name) {
            return Err(MappingError::duplicate("query", name).into());
        }
        Ok(())
    }

    pub fn add_query(&mut self, query: NamedQueryDefinition) -> Result<()> {
        self.check_query_name(&query.name)?;
        self.queries.insert(query.name.clone(), query);
        Ok(())
    }

    pub fn add_sql_query(&mut self, query: NamedSqlQueryDefinition) -> Result<()> {
        self.check_query_name(&query.name)?;
        self.sql_queries.insert(query.name.clone(), query);
        Ok(())
    }

    pub fn add_result_set_mapping(&mut self, mapping: ResultSetMapping) -> Result<()> {
        if self.result_set_mappings.contains_key(&mapping.name) {
            return Err(MappingError::duplicate("resultSet", &mapping.name).into());
        }
        self.result_set_mappings
            .insert(mapping.name.clone(), mapping);
        Ok(())
    }

    pub fn query(&self, name: &str) -> Option<&NamedQueryDefinition> {
        self.queries.get(name)
    }

    pub fn sql_query(&self, name: &str) -> Option<&NamedSqlQueryDefinition> {
        self.sql_queries.get(name)
    }

    pub fn result_set_mapping(&self, name: &str) -> Option<&ResultSetMapping> {
        self.result_set_mappings.get(name)
    }

    pub fn queries(&self) -> &BTreeMap<String, NamedQueryDefinition> {
        &self.queries
    }

    pub fn sql_queries(&self) -> &BTreeMap<String, NamedSqlQueryDefinition> {
        &self.sql_queries
    }

    pub fn result_set_mappings(&self) -> &BTreeMap<String, ResultSetMapping> {
        &self.result_set_mappings
    }

    // ==================== Pending work ====================

    /// Queue a deferred operation, at the front when it must precede work
    /// already queued.
    pub fn enqueue_second_pass(&mut self, op: SecondPass, at_front: bool) {
        if at_front {
            self.second_passes.insert(0, op);
        } else {
            self.second_passes.push(op);
        }
    }

    pub fn pending_second_passes(&self) -> usize {
        self.second_passes.len()
    }

    /// Remove and return the first queued operation `admits` accepts.
    pub(crate) fn take_next_second_pass(
        &mut self,
        admits: fn(&SecondPass) -> bool,
    ) -> Option<SecondPass> {
        let index = self.second_passes.iter().position(admits)?;
        Some(self.second_passes.remove(index))
    }

    pub fn enqueue_extends_entry(&mut self, entry: ExtendsQueueEntry) {
        tracing::debug!(
            superclass = %entry.explicit_name,
            package = ?entry.mapping_package,
            "Deferring document until its superclass is mapped"
        );
        self.extends_queue.push(entry);
    }

    pub fn extends_queue(&self) -> &[ExtendsQueueEntry] {
        &self.extends_queue
    }

    pub(crate) fn remove_extends_entry(&mut self, index: usize) -> ExtendsQueueEntry {
        self.extends_queue.remove(index)
    }

    pub fn add_property_reference(&mut self, reference: PropertyReference) {
        self.property_references.push(reference);
    }

    /// Record a property-ref that must be backed by a unique key.
    pub fn add_unique_property_reference(&mut self, entity: &str, property: &str) {
        self.add_property_reference(PropertyReference::new(entity, property, true));
    }

    pub fn property_references(&self) -> &[PropertyReference] {
        &self.property_references
    }

    pub(crate) fn take_property_references(&mut self) -> Vec<PropertyReference> {
        std::mem::take(&mut self.property_references)
    }
}

pub(crate) fn unknown_role(role: &str) -> MappingError {
    MappingError::new(
        MappingErrorKind::UnknownCollectionRole,
        format!("collection role not found: {}", role),
    )
    .with_role(role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormbind_core::{IdentifierMapping, InheritanceKind, PropertyMapping};

    fn mappings() -> Mappings {
        Mappings::new(MappingConfig::default())
    }

    fn employee(table: TableId) -> EntityMapping {
        let mut entity = EntityMapping::new("Employee", InheritanceKind::Root, table);
        entity.identifier = Some(IdentifierMapping {
            property_name: Some("id".to_string()),
            value: ValueMapping::basic(vec!["EMP_ID".to_string()], None),
            generator: None,
        });
        entity.add_property(PropertyMapping::new(
            "badge",
            ValueMapping::basic(vec!["BADGE".to_string()], None),
        ));
        entity
    }

    #[test]
    fn same_identity_yields_one_table() {
        let mut m = mappings();
        let a = m.add_or_get_table(TableIdentity::new("EMPLOYEE").with_schema("hr"));
        let b = m.add_or_get_table(TableIdentity::new("EMPLOYEE").with_schema("hr"));
        let c = m.add_or_get_table(TableIdentity::new("EMPLOYEE"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(m.tables().count(), 2);
    }

    #[test]
    fn concrete_registration_clears_abstract_flag() {
        let mut m = mappings();
        let id = m.add_table(TableIdentity::new("BASE"), None, true);
        assert!(m.table(id).is_abstract);
        m.add_table(TableIdentity::new("BASE"), None, false);
        assert!(!m.table(id).is_abstract);
    }

    #[test]
    fn backticks_and_ansi_quotes_converge() {
        let mut m = mappings();
        let a = m.add_or_get_table(TableIdentity::new("`Order`"));
        let b = m.add_or_get_table(TableIdentity::new("\"Order\""));
        assert_eq!(a, b);
    }

    #[test]
    fn duplicate_entity_keeps_the_first() {
        let mut m = mappings();
        let t1 = m.add_or_get_table(TableIdentity::new("EMPLOYEE"));
        let t2 = m.add_or_get_table(TableIdentity::new("STAFF"));
        m.add_entity(employee(t1)).unwrap();

        let err = m.add_entity(employee(t2)).unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(m.entity_count(), 1);
        assert_eq!(m.entity("Employee").unwrap().table, t1);
    }

    #[test]
    fn denormalized_table_rejects_existing_identity_and_includes_key() {
        let mut m = mappings();
        let root = m.add_or_get_table(TableIdentity::new("VEHICLE"));
        m.table_mut(root).create_primary_key(&["ID".to_string()]);

        let err = m
            .add_denormalized_table(TableIdentity::new("VEHICLE"), root)
            .unwrap_err();
        assert!(err.is_duplicate());

        let car = m
            .add_denormalized_table(TableIdentity::new("CAR"), root)
            .unwrap();
        assert_eq!(m.primary_key_columns(car), vec!["ID"]);
    }

    #[test]
    fn imports_tolerate_repeats_but_not_conflicts() {
        let mut m = mappings();
        m.add_import("org.hr.Employee", "Employee").unwrap();
        m.add_import("org.hr.Employee", "Employee").unwrap();
        let err = m.add_import("org.crm.Employee", "Employee").unwrap_err();
        assert!(err.is_duplicate());
        assert!(err.to_string().contains("auto-import"));
    }

    #[test]
    fn resolve_class_tries_package_and_imports() {
        let mut m = mappings();
        let t = m.add_or_get_table(TableIdentity::new("EMPLOYEE"));
        let mut entity = employee(t);
        entity.entity_name = "org.hr.Employee".to_string();
        m.add_entity(entity).unwrap();

        assert_eq!(
            m.resolve_class("Employee", Some("org.hr")).as_deref(),
            Some("org.hr.Employee")
        );
        assert_eq!(m.resolve_class("Employee", None), None);
        m.add_import("org.hr.Employee", "Employee").unwrap();
        assert_eq!(
            m.resolve_class("Employee", None).as_deref(),
            Some("org.hr.Employee")
        );
    }

    #[test]
    fn query_names_are_shared_between_object_and_native_queries() {
        let mut m = mappings();
        m.add_query(NamedQueryDefinition {
            name: "byName".to_string(),
            query: "from Employee e where e.name = :name".to_string(),
            options: ormbind_core::QueryOptions::default(),
        })
        .unwrap();
        let err = m
            .add_sql_query(NamedSqlQueryDefinition {
                name: "byName".to_string(),
                sql: "select * from EMPLOYEE".to_string(),
                result: ormbind_core::ResultBinding::Reference("x".to_string()),
                synchronized_tables: Vec::new(),
                callable: false,
                options: ormbind_core::QueryOptions::default(),
            })
            .unwrap_err();
        assert!(err.is_duplicate());
        assert!(m.sql_query("byName").is_none());
    }

    #[test]
    fn logical_names_reject_conflicting_bindings() {
        let mut m = mappings();
        let t = m.add_or_get_table(TableIdentity::new("EMPLOYEE"));
        m.add_table_binding("Employee", t, None).unwrap();
        m.add_table_binding("Employee", t, None).unwrap();
        assert!(m.add_table_binding("Staff", t, None).unwrap_err().is_duplicate());
        assert_eq!(m.logical_table_name(t), Some("Employee"));

        m.add_column_binding("name", "NAME", t).unwrap();
        assert!(m.add_column_binding("name", "FULL_NAME", t).is_err());
        assert!(m.add_column_binding("fullName", "NAME", t).is_err());
        assert_eq!(m.physical_column_name("name", t), Some("NAME"));
        assert_eq!(m.logical_column_name("NAME", t), Some("name"));
    }

    #[test]
    fn column_lookups_walk_denormalized_supertables() {
        let mut m = mappings();
        let root = m.add_or_get_table(TableIdentity::new("VEHICLE"));
        let car = m
            .add_denormalized_table(TableIdentity::new("CAR"), root)
            .unwrap();
        m.add_column_binding("plate", "PLATE", root).unwrap();
        assert_eq!(m.physical_column_name("plate", car), Some("PLATE"));
        assert_eq!(m.physical_column_name("wheels", car), None);
    }

    #[test]
    fn referenced_property_walks_superclasses() {
        let mut m = mappings();
        let t = m.add_or_get_table(TableIdentity::new("EMPLOYEE"));
        let mt = m.add_or_get_table(TableIdentity::new("MANAGER"));
        m.add_entity(employee(t)).unwrap();
        let mut manager = EntityMapping::new("Manager", InheritanceKind::JoinedSubclass, mt);
        manager.superclass = Some("Employee".to_string());
        manager.key_columns = vec!["MGR_ID".to_string()];
        m.add_entity(manager).unwrap();

        assert!(m.referenced_property("Manager", "badge").is_some());
        assert_eq!(m.property_owner("Manager", "id").unwrap().entity_name, "Employee");
        assert_eq!(m.root_entity("Manager").unwrap().entity_name, "Employee");
        assert_eq!(m.entity_key_columns("Manager"), vec!["MGR_ID"]);
        assert_eq!(m.entity_key_columns("Employee"), vec!["EMP_ID"]);

        m.referenced_property_mut("Manager", "badge")
            .unwrap()
            .alternate_unique_key = true;
        assert!(
            m.entity("Employee")
                .unwrap()
                .find_value("badge")
                .unwrap()
                .alternate_unique_key
        );
    }
}
