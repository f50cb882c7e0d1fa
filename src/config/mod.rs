/// Configuration management for loadguard

use crate::cache::Cache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Default healthy-load threshold
pub const DEFAULT_THRESHOLD: f64 = 0.75;

/// Default cache TTL for load samples, in seconds
pub const DEFAULT_CACHE_TTL_SECS: u64 = 60;

/// Global guard configuration
///
/// Created once at process configuration time and treated as immutable
/// afterwards. `capacity_units` and `cache` have no defaults and are checked
/// by `validate()` at the startup boundary; the per-request path tolerates an
/// unvalidated configuration through the estimator's fallbacks instead of
/// panicking.
pub struct Configuration {
    /// Nominal concurrency budget of the database (e.g. vCPU count)
    pub capacity_units: Option<u32>,
    /// Healthy-load threshold, a fraction in (0, 1]
    pub threshold: f64,
    /// TTL for cached load samples, in seconds
    pub cache_ttl_secs: u64,
    cache: Option<Arc<dyn Cache>>,
    overrides: HashMap<String, TargetOverride>,
}

/// Per-database override of the global configuration
///
/// Only capacity and threshold are overridable; the cache store and TTL are
/// always taken from the global configuration. Unset fields inherit the
/// global value at lookup time, so a later change to the global threshold is
/// visible through existing overrides.
#[derive(Debug, Clone, Default)]
pub struct TargetOverride {
    pub capacity_units: Option<u32>,
    pub threshold: Option<f64>,
}

/// Effective configuration for one logical database
///
/// Snapshot produced by `Configuration::for_target` with global defaults
/// applied to unset override fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub capacity_units: Option<u32>,
    pub threshold: f64,
    pub cache_ttl_secs: u64,
}

impl ResolvedConfig {
    /// Largest active-session count still considered healthy
    pub fn max_healthy_sessions(&self) -> Option<u32> {
        self.capacity_units
            .map(|units| (f64::from(units) * self.threshold).floor() as u32)
    }
}

impl Configuration {
    pub fn new() -> Self {
        Self {
            capacity_units: None,
            threshold: DEFAULT_THRESHOLD,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            cache: None,
            overrides: HashMap::new(),
        }
    }

    /// Install the cache store used for load samples
    pub fn set_cache(&mut self, cache: Arc<dyn Cache>) {
        self.cache = Some(cache);
    }

    /// The configured cache store, if any
    pub fn cache(&self) -> Option<&Arc<dyn Cache>> {
        self.cache.as_ref()
    }

    /// Register or replace an override for a logical database
    pub fn override_for<F>(&mut self, name: &str, mutator: F)
    where
        F: FnOnce(&mut TargetOverride),
    {
        let entry = self.overrides.entry(name.to_string()).or_default();
        mutator(entry);
    }

    /// Resolve the effective configuration for a logical database
    ///
    /// Inheritance is field-level and evaluated here, not snapshotted when
    /// the override was registered.
    pub fn for_target(&self, name: &str) -> ResolvedConfig {
        match self.overrides.get(name) {
            Some(target) => ResolvedConfig {
                capacity_units: target.capacity_units.or(self.capacity_units),
                threshold: target.threshold.unwrap_or(self.threshold),
                cache_ttl_secs: self.cache_ttl_secs,
            },
            None => ResolvedConfig {
                capacity_units: self.capacity_units,
                threshold: self.threshold,
                cache_ttl_secs: self.cache_ttl_secs,
            },
        }
    }

    /// Largest active-session count still considered healthy, per the global
    /// capacity and threshold
    pub fn max_healthy_sessions(&self) -> Option<u32> {
        self.capacity_units
            .map(|units| (f64::from(units) * self.threshold).floor() as u32)
    }

    /// Validate required settings
    ///
    /// Called once at the startup boundary; a failure here should halt
    /// startup rather than be retried.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.capacity_units {
            None => {
                return Err(ConfigError::ValidationError(
                    "capacity_units must be configured".to_string(),
                ))
            }
            Some(0) => {
                return Err(ConfigError::ValidationError(
                    "capacity_units must be greater than 0".to_string(),
                ))
            }
            Some(_) => {}
        }

        if self.cache.is_none() {
            return Err(ConfigError::ValidationError(
                "cache must be configured".to_string(),
            ));
        }

        Ok(())
    }

    /// Load tunables from a TOML file, overlaying the current values
    ///
    /// The cache store cannot come from a file and is always wired
    /// programmatically.
    pub fn load_tunables_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        let tunables: Tunables =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        self.apply_tunables(tunables);
        Ok(())
    }

    /// Overlay parsed tunables onto the current configuration
    pub fn apply_tunables(&mut self, tunables: Tunables) {
        if let Some(units) = tunables.capacity_units {
            self.capacity_units = Some(units);
        }
        if let Some(threshold) = tunables.threshold {
            self.threshold = threshold;
        }
        if let Some(ttl) = tunables.cache_ttl_secs {
            self.cache_ttl_secs = ttl;
        }
        for (name, entry) in tunables.overrides {
            self.override_for(&name, |target| {
                if entry.capacity_units.is_some() {
                    target.capacity_units = entry.capacity_units;
                }
                if entry.threshold.is_some() {
                    target.threshold = entry.threshold;
                }
            });
        }
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("capacity_units", &self.capacity_units)
            .field("threshold", &self.threshold)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("cache", &self.cache.as_ref().map(|_| "<configured>"))
            .field("overrides", &self.overrides)
            .finish()
    }
}

/// File-loadable tunables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tunables {
    /// Global capacity units
    pub capacity_units: Option<u32>,
    /// Global healthy-load threshold
    pub threshold: Option<f64>,
    /// Cache TTL in seconds
    pub cache_ttl_secs: Option<u64>,
    /// Per-database overrides, keyed by logical database name
    #[serde(default)]
    pub overrides: HashMap<String, OverrideTunables>,
}

/// Per-database tunables within a tunables file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverrideTunables {
    pub capacity_units: Option<u32>,
    pub threshold: Option<f64>,
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
