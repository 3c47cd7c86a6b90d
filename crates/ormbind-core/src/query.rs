//! Named query definitions and native-query result mappings.

use crate::table::TableId;
use serde::Serialize;
use std::collections::BTreeMap;

/// Options shared by object and native named queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryOptions {
    pub cacheable: bool,
    pub cache_region: Option<String>,
    pub timeout: Option<u32>,
    pub fetch_size: Option<u32>,
    pub read_only: bool,
    pub comment: Option<String>,
    pub parameter_types: BTreeMap<String, String>,
}

/// A named object query. Its text is opaque here and bound immediately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedQueryDefinition {
    pub name: String,
    pub query: String,
    pub options: QueryOptions,
}

/// A named native SQL query whose result shape has been resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedSqlQueryDefinition {
    pub name: String,
    pub sql: String,
    pub result: ResultBinding,
    pub synchronized_tables: Vec<String>,
    pub callable: bool,
    pub options: QueryOptions,
}

impl NamedSqlQueryDefinition {
    /// Name of the result-set mapping this query uses, if bound by reference.
    pub fn result_set_ref(&self) -> Option<&str> {
        match &self.result {
            ResultBinding::Reference(name) => Some(name),
            ResultBinding::Inline(_) => None,
        }
    }
}

/// How a native query's columns map onto the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ResultBinding {
    /// By name, to a registered [`ResultSetMapping`].
    Reference(String),
    /// Returns declared on the query itself.
    Inline(ResultSetMapping),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultSetMapping {
    pub name: String,
    pub returns: Vec<QueryReturn>,
}

impl ResultSetMapping {
    pub fn alias(&self, alias: &str) -> Option<&QueryReturn> {
        self.returns.iter().find(|r| r.alias() == Some(alias))
    }
}

/// One resolved element of a native query result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum QueryReturn {
    /// A root entity.
    Root {
        alias: String,
        entity: String,
        property_results: BTreeMap<String, Vec<String>>,
    },
    /// An association fetched through another alias.
    Join {
        alias: String,
        owner_alias: String,
        property: String,
        /// Collection role or associated entity reached by `property`.
        target: String,
        is_collection: bool,
    },
    /// The elements of a collection.
    CollectionLoad {
        alias: String,
        role: String,
        table: TableId,
        property_results: BTreeMap<String, Vec<String>>,
    },
    Scalar {
        column: String,
        type_name: Option<String>,
    },
}

impl QueryReturn {
    pub fn alias(&self) -> Option<&str> {
        match self {
            QueryReturn::Root { alias, .. }
            | QueryReturn::Join { alias, .. }
            | QueryReturn::CollectionLoad { alias, .. } => Some(alias),
            QueryReturn::Scalar { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_are_looked_up_across_returns() {
        let mapping = ResultSetMapping {
            name: "catsAndKittens".to_string(),
            returns: vec![
                QueryReturn::Root {
                    alias: "cat".to_string(),
                    entity: "org.zoo.Cat".to_string(),
                    property_results: BTreeMap::new(),
                },
                QueryReturn::Join {
                    alias: "kitten".to_string(),
                    owner_alias: "cat".to_string(),
                    property: "kittens".to_string(),
                    target: "org.zoo.Cat.kittens".to_string(),
                    is_collection: true,
                },
                QueryReturn::Scalar {
                    column: "total".to_string(),
                    type_name: Some("long".to_string()),
                },
            ],
        };

        assert!(matches!(
            mapping.alias("kitten"),
            Some(QueryReturn::Join { is_collection: true, .. })
        ));
        assert!(mapping.alias("total").is_none());
    }

    #[test]
    fn reference_binding_exposes_its_name() {
        let query = NamedSqlQueryDefinition {
            name: "allCats".to_string(),
            sql: "select * from CAT".to_string(),
            result: ResultBinding::Reference("catsAndKittens".to_string()),
            synchronized_tables: vec!["CAT".to_string()],
            callable: false,
            options: QueryOptions::default(),
        };
        assert_eq!(query.result_set_ref(), Some("catsAndKittens"));
    }
}
