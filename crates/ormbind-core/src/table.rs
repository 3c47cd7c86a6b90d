//! Table, column and constraint models.
//!
//! Tables are registered once per identity in the repository and referred
//! to everywhere else through a [`TableId`]. Foreign keys start life as
//! [`PendingAssociation`]s recorded while binding properties; they only
//! become [`ForeignKeyMapping`]s when the foreign-key resolver calls
//! [`TableMapping::create_foreign_keys`].

use crate::error::{MappingError, MappingErrorKind};
use crate::naming::{qualify_table, unqualify};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable handle of a table registered in the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TableId(usize);

impl TableId {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The (catalog, schema, name) triple identifying a physical table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TableIdentity {
    #[serde(default)]
    pub catalog: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    pub name: String,
}

impl TableIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            catalog: None,
            schema: None,
            name: name.into(),
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = Some(catalog.into());
        self
    }

    /// The repository key for this identity.
    pub fn qualified(&self) -> String {
        qualify_table(self.catalog.as_deref(), self.schema.as_deref(), &self.name)
    }
}

impl fmt::Display for TableIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualified())
    }
}

/// Referential action for foreign key constraints (ON DELETE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    /// No action - raise error if any references exist.
    #[default]
    NoAction,
    /// Restrict - same as NO ACTION.
    Restrict,
    /// Cascade - automatically delete referencing rows.
    Cascade,
    /// Set null - set referencing columns to NULL.
    SetNull,
    /// Set default - set referencing columns to their default values.
    SetDefault,
}

impl ReferentialAction {
    /// Get the SQL representation of this action.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    pub type_name: Option<String>,
    pub nullable: bool,
    pub unique: bool,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: None,
            nullable: true,
            unique: false,
        }
    }

    pub fn type_name(mut self, type_name: Option<String>) -> Self {
        self.type_name = type_name;
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrimaryKey {
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UniqueKey {
    pub name: String,
    pub columns: Vec<String>,
}

/// A foreign key declared by an association but not yet materialised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingAssociation {
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub referenced_entity: Option<String>,
    pub on_delete: ReferentialAction,
}

/// Identity of a foreign key: its source table and constraint name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ForeignKeyId {
    pub table: TableId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKeyMapping {
    pub name: String,
    pub table: TableId,
    pub columns: Vec<String>,
    /// Target entity as named by the association. `None` is a mapping error
    /// once the foreign key is resolved.
    pub referenced_entity: Option<String>,
    pub referenced_table: Option<TableId>,
    pub referenced_columns: Vec<String>,
    pub on_delete: ReferentialAction,
}

impl ForeignKeyMapping {
    pub fn id(&self) -> ForeignKeyId {
        ForeignKeyId {
            table: self.table,
            name: self.name.clone(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.referenced_table.is_some()
    }

    /// Point this foreign key at `target` and line its columns up with the
    /// target's key columns.
    pub fn align_columns(
        &mut self,
        target: TableId,
        target_key: &[String],
    ) -> std::result::Result<(), MappingError> {
        if self.columns.len() != target_key.len() {
            return Err(MappingError::new(
                MappingErrorKind::ColumnCountMismatch,
                format!(
                    "Foreign key ({} [{}]) must have same number of columns as the referenced primary key ([{}])",
                    self.name,
                    self.columns.join(","),
                    target_key.join(",")
                ),
            ));
        }
        self.referenced_table = Some(target);
        self.referenced_columns = target_key.to_vec();
        Ok(())
    }
}

/// A physical (or denormalized) table.
#[derive(Debug, Clone, Serialize)]
pub struct TableMapping {
    pub id: TableId,
    pub identity: TableIdentity,
    pub subselect: Option<String>,
    pub is_abstract: bool,
    pub columns: Vec<Column>,
    pub primary_key: Option<PrimaryKey>,
    pub unique_keys: Vec<UniqueKey>,
    pub foreign_keys: Vec<ForeignKeyMapping>,
    pub pending_associations: Vec<PendingAssociation>,
    /// For denormalized tables: the table whose columns and key are included.
    pub included_table: Option<TableId>,
    pub check_constraints: Vec<String>,
}

impl TableMapping {
    pub fn new(id: TableId, identity: TableIdentity) -> Self {
        Self {
            id,
            identity,
            subselect: None,
            is_abstract: false,
            columns: Vec::new(),
            primary_key: None,
            unique_keys: Vec::new(),
            foreign_keys: Vec::new(),
            pending_associations: Vec::new(),
            included_table: None,
            check_constraints: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn qualified_name(&self) -> String {
        self.identity.qualified()
    }

    pub fn is_denormalized(&self) -> bool {
        self.included_table.is_some()
    }

    /// Add a column unless one with the same name exists. Returns whether it
    /// was added.
    pub fn add_column(&mut self, column: Column) -> bool {
        if self.has_column(&column.name) {
            return false;
        }
        self.columns.push(column);
        true
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Create the primary key from `columns` unless the table already has
    /// one. Returns whether a key was created.
    pub fn create_primary_key(&mut self, columns: &[String]) -> bool {
        if self.primary_key.is_some() || columns.is_empty() {
            return false;
        }
        for column in columns {
            if let Some(existing) = self.columns.iter_mut().find(|c| &c.name == column) {
                existing.nullable = false;
            }
        }
        self.primary_key = Some(PrimaryKey {
            name: format!("pk_{}", self.identity.name),
            columns: columns.to_vec(),
        });
        true
    }

    pub fn add_unique_key(&mut self, columns: &[String]) {
        if self.unique_keys.iter().any(|uk| uk.columns == columns) {
            return;
        }
        self.unique_keys.push(UniqueKey {
            name: format!("uk_{}_{}", self.identity.name, columns.join("_")),
            columns: columns.to_vec(),
        });
    }

    pub fn add_association(&mut self, association: PendingAssociation) {
        self.pending_associations.push(association);
    }

    /// Materialise every pending association as a foreign key.
    ///
    /// Associations with the same columns and target collapse into one
    /// foreign key. Returns the number of foreign keys created; an explicit
    /// name already taken by another foreign key is a `DuplicateMapping`.
    pub fn create_foreign_keys(&mut self) -> std::result::Result<usize, MappingError> {
        let pending = std::mem::take(&mut self.pending_associations);
        let mut created = 0;
        for association in pending {
            let exists = self.foreign_keys.iter().any(|fk| {
                fk.columns == association.columns
                    && fk.referenced_entity == association.referenced_entity
            });
            if exists {
                continue;
            }
            let name = match association.name {
                Some(name) => {
                    self.check_foreign_key_name(&name)?;
                    name
                }
                None => self.foreign_key_name(
                    &association.columns,
                    association.referenced_entity.as_deref(),
                ),
            };
            self.foreign_keys.push(ForeignKeyMapping {
                name,
                table: self.id,
                columns: association.columns,
                referenced_entity: association.referenced_entity,
                referenced_table: None,
                referenced_columns: Vec::new(),
                on_delete: association.on_delete,
            });
            created += 1;
        }
        Ok(created)
    }

    /// A foreign-key name not used by this table yet: `fk_{table}_{columns}`,
    /// then suffixed with the target entity, then with a counter.
    pub fn foreign_key_name(&self, columns: &[String], referenced_entity: Option<&str>) -> String {
        let base = format!("fk_{}_{}", self.identity.name, columns.join("_"));
        if self.foreign_key(&base).is_none() {
            return base;
        }
        if let Some(entity) = referenced_entity {
            let named = format!("{}_{}", base, unqualify(entity));
            if self.foreign_key(&named).is_none() {
                return named;
            }
        }
        let mut counter = 2;
        loop {
            let numbered = format!("{}_{}", base, counter);
            if self.foreign_key(&numbered).is_none() {
                return numbered;
            }
            counter += 1;
        }
    }

    fn check_foreign_key_name(&self, name: &str) -> std::result::Result<(), MappingError> {
        if self.foreign_key(name).is_some() {
            return Err(MappingError::new(
                MappingErrorKind::DuplicateMapping,
                format!("Duplicate foreign key name: {}", name),
            )
            .with_table(self.qualified_name()));
        }
        Ok(())
    }

    /// Add a foreign key whose target is already known. A key equal to an
    /// existing one (same columns and target) is skipped.
    pub fn add_resolved_foreign_key(
        &mut self,
        fk: ForeignKeyMapping,
    ) -> std::result::Result<(), MappingError> {
        let equivalent = self.foreign_keys.iter().any(|existing| {
            existing.columns == fk.columns
                && existing.referenced_table == fk.referenced_table
                && existing.referenced_columns == fk.referenced_columns
        });
        if equivalent {
            tracing::debug!(
                table = %self.qualified_name(),
                fk = %fk.name,
                "Equivalent foreign key already present"
            );
            return Ok(());
        }
        self.check_foreign_key_name(&fk.name)?;
        self.foreign_keys.push(fk);
        Ok(())
    }

    pub fn foreign_key(&self, name: &str) -> Option<&ForeignKeyMapping> {
        self.foreign_keys.iter().find(|fk| fk.name == name)
    }
}
