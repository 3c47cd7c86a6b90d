//! Resolver configuration.

use ormbind_core::{ConfigError, Result};
use serde::{Deserialize, Serialize};

/// Settings that influence how fragments are bound and resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// Package used when a document does not declare one
    pub default_package: Option<String>,
    /// Register unqualified entity names as imports
    pub auto_import: bool,
    /// Quote every table and column identifier
    pub globally_quoted_identifiers: bool,
    /// Recursion limit when resolving foreign keys through joined subclasses
    pub max_inheritance_depth: usize,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            default_package: None,
            auto_import: true,
            globally_quoted_identifiers: false,
            max_inheritance_depth: 64,
        }
    }
}

impl MappingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from JSON; missing keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the default package.
    pub fn default_package(mut self, package: impl Into<String>) -> Self {
        self.default_package = Some(package.into());
        self
    }

    /// Enable or disable auto-import.
    pub fn auto_import(mut self, enabled: bool) -> Self {
        self.auto_import = enabled;
        self
    }

    /// Quote all identifiers.
    pub fn globally_quoted_identifiers(mut self, enabled: bool) -> Self {
        self.globally_quoted_identifiers = enabled;
        self
    }

    /// Set the inheritance recursion limit.
    pub fn max_inheritance_depth(mut self, depth: usize) -> Self {
        self.max_inheritance_depth = depth;
        self
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.max_inheritance_depth == 0 {
            return Err(ConfigError::new(
                "max_inheritance_depth must be at least 1",
            ));
        }
        if self
            .default_package
            .as_deref()
            .is_some_and(|p| p.is_empty() || p.starts_with('.') || p.ends_with('.'))
        {
            return Err(ConfigError::new(format!(
                "invalid default_package {:?}",
                self.default_package
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormbind_core::Error;

    #[test]
    fn defaults() {
        let config = MappingConfig::default();
        assert!(config.auto_import);
        assert!(!config.globally_quoted_identifiers);
        assert_eq!(config.max_inheritance_depth, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn json_fills_missing_keys_with_defaults() {
        let config =
            MappingConfig::from_json_str(r#"{"default_package": "org.hr", "auto_import": false}"#)
                .unwrap();
        assert_eq!(config.default_package.as_deref(), Some("org.hr"));
        assert!(!config.auto_import);
        assert_eq!(config.max_inheritance_depth, 64);
    }

    #[test]
    fn zero_depth_is_rejected() {
        let err = MappingConfig::from_json_str(r#"{"max_inheritance_depth": 0}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(
            MappingConfig::new()
                .default_package("org.")
                .validate()
                .is_err()
        );
    }
}
