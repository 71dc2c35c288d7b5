//! File-based configuration
//!
//! Namespace mappings and cleanup tuning are read from a TOML file:
//!
//! ```toml
//! [[namespaces]]
//! local = "app"
//! foreign = "app-ns-foreign"
//!
//! [cleanup]
//! max_attempts = 6
//! initial_delay_ms = 20
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::reflection::{NamespacePair, RetryPolicy};

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamespaceMapping {
    pub local: String,
    pub foreign: String,
}

/// Overrides of the namespace cleanup retry policy
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CleanupConfig {
    pub max_attempts: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReflectorConfig {
    #[serde(default)]
    pub namespaces: Vec<NamespaceMapping>,
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

impl ReflectorConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
            .map_err(|e| Error::ConfigError(format!("{}: {}", path.display(), e)))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| Error::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Mappings must be one-to-one with no empty names
    pub fn validate(&self) -> Result<()> {
        let mut locals = HashSet::new();
        let mut foreigns = HashSet::new();
        for mapping in &self.namespaces {
            if mapping.local.is_empty() || mapping.foreign.is_empty() {
                return Err(Error::ConfigError(format!(
                    "empty namespace name in mapping {:?}",
                    mapping
                )));
            }
            if !locals.insert(mapping.local.as_str()) {
                return Err(Error::ConfigError(format!(
                    "namespace {} mapped twice",
                    mapping.local
                )));
            }
            if !foreigns.insert(mapping.foreign.as_str()) {
                return Err(Error::ConfigError(format!(
                    "foreign namespace {} is the target of two mappings",
                    mapping.foreign
                )));
            }
        }
        if self.cleanup.max_attempts == Some(0) {
            return Err(Error::ConfigError(
                "cleanup.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn pairs(&self) -> Vec<NamespacePair> {
        self.namespaces
            .iter()
            .map(|m| NamespacePair::new(&m.local, &m.foreign))
            .collect()
    }

    pub fn cleanup_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            max_attempts: self.cleanup.max_attempts.unwrap_or(defaults.max_attempts),
            initial_delay: self
                .cleanup
                .initial_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_delay),
            max_delay: self
                .cleanup
                .max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
            ..defaults
        }
    }
}
