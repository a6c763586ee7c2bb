// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Layered Property Configuration
//!
//! Correlator settings can come from several places. Each property
//! remembers where it came from, and a later `set` only wins when its source
//! has equal or higher priority than the current one. Layers can therefore
//! be merged in any order.
//!
//! ## Property Sources (Priority: Low to High)
//!
//! 1. **ConfigFile** - YAML/TOML configuration file
//! 2. **Environment** - `CFR_*` environment variables
//! 3. **CommandLine** - `--set key=value` given to `cfr-tool`
//!
//! Anything no layer mentions keeps its built-in default.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let mut layers = FlatConfig::new();
//! layers.set("pool_size", "32", PropertySource::Environment);
//! layers.merge(&FlatConfig::from_file(path)?);
//! // the environment still wins over the file
//! assert_eq!(layers.get("pool_size"), Some(&"32".to_string()));
//! ```

use crate::core::error::{CfrError, CfrResult};
use std::collections::HashMap;
use std::path::Path;

/// Property source identifier with priority ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertySource {
    /// Configuration file (priority: 0)
    ConfigFile,
    /// Process environment (priority: 1)
    Environment,
    /// Command-line override (priority: 2)
    CommandLine,
}

impl PropertySource {
    /// Get numeric priority for comparison (higher = more important)
    #[inline]
    pub const fn priority(&self) -> u8 {
        match self {
            PropertySource::ConfigFile => 0,
            PropertySource::Environment => 1,
            PropertySource::CommandLine => 2,
        }
    }

    #[inline]
    pub const fn description(&self) -> &'static str {
        match self {
            PropertySource::ConfigFile => "configuration file",
            PropertySource::Environment => "environment",
            PropertySource::CommandLine => "command line",
        }
    }
}

/// Flat key-value configuration with source tracking
#[derive(Debug, Clone, Default)]
pub struct FlatConfig {
    properties: HashMap<String, String>,
    sources: HashMap<String, PropertySource>,
}

impl FlatConfig {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property; ignored when the existing value came from a source
    /// of higher priority.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>, source: PropertySource) {
        let key = key.into();

        if let Some(existing_source) = self.sources.get(&key) {
            if existing_source.priority() > source.priority() {
                return;
            }
        }

        self.properties.insert(key.clone(), value.into());
        self.sources.insert(key, source);
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&String> {
        self.properties.get(key)
    }

    #[inline]
    pub fn get_with_source(&self, key: &str) -> Option<(&String, PropertySource)> {
        self.properties
            .get(key)
            .and_then(|value| self.sources.get(key).map(|source| (value, *source)))
    }

    #[inline]
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.properties.keys()
    }

    /// Merge another configuration into this one (respects priorities)
    pub fn merge(&mut self, other: &FlatConfig) {
        for (key, value) in &other.properties {
            if let Some(source) = other.sources.get(key) {
                self.set(key.clone(), value.clone(), *source);
            }
        }
    }

    /// Collect `CFR_*` variables, lower-cased without the prefix, as
    /// `Environment` properties.
    pub fn from_env_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut config = Self::new();
        for (key, value) in vars {
            if let Some(name) = key.strip_prefix("CFR_") {
                config.set(name.to_lowercase(), value, PropertySource::Environment);
            }
        }
        config
    }

    /// Parse `key=value` overrides as `CommandLine` properties.
    pub fn from_assignments<'a, I>(assignments: I) -> CfrResult<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut config = Self::new();
        for assignment in assignments {
            match assignment.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    config.set(key.trim(), value.trim(), PropertySource::CommandLine)
                }
                _ => {
                    return Err(CfrError::configuration(format!(
                        "Expected key=value, got '{}'",
                        assignment
                    )))
                }
            }
        }
        Ok(config)
    }

    /// Top-level scalars of a YAML document as `ConfigFile` properties.
    pub fn from_yaml_str(text: &str) -> CfrResult<Self> {
        let mapping: serde_yaml::Mapping = match serde_yaml::from_str(text)? {
            serde_yaml::Value::Mapping(mapping) => mapping,
            serde_yaml::Value::Null => return Ok(Self::new()),
            _ => return Err(CfrError::configuration("YAML: expected a mapping")),
        };
        let mut config = Self::new();
        for (key, value) in mapping {
            let key = match key {
                serde_yaml::Value::String(key) => key,
                other => {
                    return Err(CfrError::configuration(format!(
                        "Non-string key {:?}",
                        other
                    )))
                }
            };
            let value = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                _ => {
                    return Err(CfrError::configuration_with_key(
                        "expected a scalar value",
                        key,
                    ))
                }
            };
            config.set(key, value, PropertySource::ConfigFile);
        }
        Ok(config)
    }

    /// Top-level scalars of a TOML document as `ConfigFile` properties.
    pub fn from_toml_str(text: &str) -> CfrResult<Self> {
        let table: toml::Table = toml::from_str(text)?;
        let mut config = Self::new();
        for (key, value) in table {
            let value = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                _ => {
                    return Err(CfrError::configuration_with_key(
                        "expected a scalar value",
                        key,
                    ))
                }
            };
            config.set(key, value, PropertySource::ConfigFile);
        }
        Ok(config)
    }

    /// Load a `.yaml`/`.yml` or `.toml` file as a `ConfigFile` layer.
    pub fn from_file(path: &Path) -> CfrResult<Self> {
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&text),
            Some("toml") => Self::from_toml_str(&text),
            other => Err(CfrError::configuration(format!(
                "Unsupported configuration format {:?} for '{}'. Use .yaml, .yml or .toml",
                other,
                path.display()
            ))),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}
