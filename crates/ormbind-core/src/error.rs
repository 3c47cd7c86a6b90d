//! Error types for mapping resolution.

use std::fmt;

/// The primary error type for all ormbind operations.
#[derive(Debug)]
pub enum Error {
    /// Mapping metadata could not be registered, bound or resolved
    Mapping(MappingError),
    /// Configuration errors
    Config(ConfigError),
    /// Serialization/deserialization errors
    Serde(String),
    /// Custom error with message (raised by caller-supplied second passes)
    Custom(String),
}

/// A failure raised while registering or resolving mapping fragments.
///
/// The identity fields (`entity`, `table`, `role`) are filled in wherever
/// the failing fragment is known, so callers can locate it.
#[derive(Debug, Clone)]
pub struct MappingError {
    pub kind: MappingErrorKind,
    pub message: String,
    pub entity: Option<String>,
    pub table: Option<String>,
    pub role: Option<String>,
    /// Every extends entry left over after the extends queue stabilised.
    /// Only populated for [`MappingErrorKind::UnresolvedSuperclass`].
    pub unresolved: Vec<UnresolvedSuperclass>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingErrorKind {
    /// An entity, collection, table, import or named query registered twice
    DuplicateMapping,
    /// One or more subclass fragments never found their superclass
    UnresolvedSuperclass,
    /// A reference names an entity that is not mapped
    UnmappedClass,
    /// An association carrying a foreign key names no target entity
    MissingReferencedEntity,
    /// A property path could not be resolved on an entity
    PropertyNotFound,
    /// A collection role is not mapped
    UnknownCollectionRole,
    /// A named query refers to an unregistered result set mapping
    UnknownResultSetMapping,
    /// A foreign key does not line up with the referenced primary key
    ColumnCountMismatch,
    /// Foreign-key resolution recursed deeper than the configured limit
    InheritanceDepthExceeded,
    /// A fragment is malformed
    InvalidFragment,
    /// An operation ran out of order or more than once
    InvalidState,
}

/// One leftover extends-queue entry: the superclass name and the package
/// of the document that referenced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedSuperclass {
    pub name: String,
    pub package: Option<String>,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl MappingError {
    /// Create a new mapping error with no identity information attached.
    pub fn new(kind: MappingErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            entity: None,
            table: None,
            role: None,
            unresolved: Vec::new(),
        }
    }

    /// A duplicate registration, e.g. `duplicate("class/entity", "Order")`.
    pub fn duplicate(type_label: &str, name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            MappingErrorKind::DuplicateMapping,
            format!("Duplicate {} mapping {}", type_label, name),
        )
    }

    /// Aggregate report for extends entries whose superclass never appeared.
    pub fn unresolved_superclasses(entries: Vec<UnresolvedSuperclass>) -> Self {
        let listed = entries
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let mut err = Self::new(
            MappingErrorKind::UnresolvedSuperclass,
            format!(
                "Following superclasses referenced in extends not found: {}",
                listed
            ),
        );
        err.unresolved = entries;
        err
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }
}

impl Error {
    /// The mapping error kind, if this is a mapping error.
    pub fn mapping_kind(&self) -> Option<MappingErrorKind> {
        match self {
            Error::Mapping(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Is this a mapping error of the given kind?
    pub fn is_mapping_kind(&self, kind: MappingErrorKind) -> bool {
        self.mapping_kind() == Some(kind)
    }

    /// Is this a duplicate registration?
    pub fn is_duplicate(&self) -> bool {
        self.is_mapping_kind(MappingErrorKind::DuplicateMapping)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Mapping(e) => write!(f, "Mapping error: {}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for MappingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        let mut context = Vec::new();
        if let Some(entity) = &self.entity {
            context.push(format!("entity '{}'", entity));
        }
        if let Some(table) = &self.table {
            context.push(format!("table '{}'", table));
        }
        if let Some(role) = &self.role {
            context.push(format!("role '{}'", role));
        }
        if !context.is_empty() {
            write!(f, " ({})", context.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for MappingError {}

impl fmt::Display for UnresolvedSuperclass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.package {
            Some(package) => write!(f, "{}[{}]", self.name, package),
            None => write!(f, "{}", self.name),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<MappingError> for Error {
    fn from(err: MappingError) -> Self {
        Error::Mapping(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

/// Result type alias for ormbind operations.
pub type Result<T> = std::result::Result<T, Error>;
