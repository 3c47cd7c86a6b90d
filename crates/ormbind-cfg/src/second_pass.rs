//! Deferred binding operations and the two-wave queue runner.
//!
//! Operations are queued on [`Mappings`] while documents are bound and run
//! during compilation, once every fragment has been seen. The runner drains
//! the queue in two waves over the same list: first everything that is not
//! a query/result-set operation, then whatever remains. Each operation is
//! removed before it runs, so it executes exactly once; operations enqueued
//! while a wave is running join the same list and run in the same compile.

use crate::binder;
use crate::mappings::Mappings;
use ormbind_core::{
    CollectionFragment, NamedSqlQueryFragment, ReferentialAction, Result, ResultSetFragment,
};
use std::collections::BTreeMap;
use std::fmt;

/// Which wave a [`SecondPass::Custom`] operation runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wave {
    Structural,
    Query,
}

/// Caller-supplied deferred work.
pub type CustomOp = Box<dyn FnOnce(&mut Mappings) -> Result<()>>;

pub enum SecondPass {
    /// Resolve a collection's key, element and index, then create its keys.
    BindCollection {
        role: String,
        fragment: Box<CollectionFragment>,
        /// Document-level metas handed down to the collection.
        inherited_metas: BTreeMap<String, String>,
    },
    /// Primary key of a root entity's table.
    CreateRootKey { entity: String },
    /// Primary key of a joined subclass table plus its foreign key to the
    /// superclass table.
    CreateJoinedSubclassKey {
        entity: String,
        on_delete: ReferentialAction,
    },
    /// Foreign key of a to-one association that targets a non-identifier
    /// property.
    PropertyRefConstraint {
        entity: String,
        property: String,
        referenced_entity: String,
        property_ref: String,
    },
    BindResultSetMapping {
        fragment: ResultSetFragment,
        package: Option<String>,
    },
    BindNamedSqlQuery {
        fragment: NamedSqlQueryFragment,
        package: Option<String>,
    },
    Custom {
        label: String,
        wave: Wave,
        op: CustomOp,
    },
}

impl SecondPass {
    pub fn custom(
        label: impl Into<String>,
        wave: Wave,
        op: impl FnOnce(&mut Mappings) -> Result<()> + 'static,
    ) -> Self {
        SecondPass::Custom {
            label: label.into(),
            wave,
            op: Box::new(op),
        }
    }

    /// Does this operation belong to the query/result-set wave?
    pub fn is_query(&self) -> bool {
        match self {
            SecondPass::BindResultSetMapping { .. } | SecondPass::BindNamedSqlQuery { .. } => true,
            SecondPass::Custom { wave, .. } => *wave == Wave::Query,
            SecondPass::BindCollection { .. }
            | SecondPass::CreateRootKey { .. }
            | SecondPass::CreateJoinedSubclassKey { .. }
            | SecondPass::PropertyRefConstraint { .. } => false,
        }
    }

    pub fn label(&self) -> String {
        match self {
            SecondPass::BindCollection { role, .. } => format!("bind collection {}", role),
            SecondPass::CreateRootKey { entity } => format!("create root key {}", entity),
            SecondPass::CreateJoinedSubclassKey { entity, .. } => {
                format!("create joined-subclass key {}", entity)
            }
            SecondPass::PropertyRefConstraint {
                entity, property, ..
            } => format!("property-ref constraint {}.{}", entity, property),
            SecondPass::BindResultSetMapping { fragment, .. } => {
                format!("bind result set {}", fragment.name)
            }
            SecondPass::BindNamedSqlQuery { fragment, .. } => {
                format!("bind sql query {}", fragment.name)
            }
            SecondPass::Custom { label, .. } => label.clone(),
        }
    }
}

impl fmt::Debug for SecondPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecondPass")
            .field("op", &self.label())
            .field("query", &self.is_query())
            .finish()
    }
}

/// Counts of operations executed per wave.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct WaveCounts {
    pub structural: usize,
    pub query: usize,
}

/// Drain the queue: structural wave first, then the query wave.
#[tracing::instrument(level = "debug", skip(mappings))]
pub fn run_second_passes(mappings: &mut Mappings) -> Result<WaveCounts> {
    tracing::info!(
        queued = mappings.pending_second_passes(),
        "Running second passes"
    );
    let structural = run_wave(mappings, |op| !op.is_query())?;
    let query = run_wave(mappings, |_| true)?;
    tracing::info!(structural, query, "Second passes complete");
    Ok(WaveCounts { structural, query })
}

fn run_wave(mappings: &mut Mappings, admits: fn(&SecondPass) -> bool) -> Result<usize> {
    let mut executed = 0;
    while let Some(op) = mappings.take_next_second_pass(admits) {
        execute(mappings, op)?;
        executed += 1;
    }
    Ok(executed)
}

fn execute(mappings: &mut Mappings, op: SecondPass) -> Result<()> {
    tracing::debug!(op = %op.label(), "Executing second pass");
    match op {
        SecondPass::BindCollection {
            role,
            fragment,
            inherited_metas,
        } => binder::collection::bind_collection(mappings, &role, &fragment, &inherited_metas),
        SecondPass::CreateRootKey { entity } => binder::entity::create_root_key(mappings, &entity),
        SecondPass::CreateJoinedSubclassKey { entity, on_delete } => {
            binder::entity::create_joined_subclass_key(mappings, &entity, on_delete)
        }
        SecondPass::PropertyRefConstraint {
            entity,
            property,
            referenced_entity,
            property_ref,
        } => binder::entity::create_property_ref_constraint(
            mappings,
            &entity,
            &property,
            &referenced_entity,
            &property_ref,
        ),
        SecondPass::BindResultSetMapping { fragment, package } => {
            binder::query::bind_result_set_mapping(mappings, &fragment, package.as_deref())
        }
        SecondPass::BindNamedSqlQuery { fragment, package } => {
            binder::query::bind_named_sql_query(mappings, &fragment, package.as_deref())
        }
        SecondPass::Custom { op, .. } => op(mappings),
    }
}
