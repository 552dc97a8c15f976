//! Configuration management for the counter engine
//!
//! TOML configuration files with environment variable overrides and
//! sensible defaults. Every field has a serde default, so a partial file
//! (or an empty one) is a valid configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dictionary::{MAX_DIMENSION_NAME_LENGTH, MAX_DIMENSION_VALUE_LENGTH};
use crate::error::{Error, Result, ValidationError};
use crate::hash::PartitionPolicy;
use crate::query::GroupingPolicy;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Storage and encoding settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Query execution settings
    #[serde(default)]
    pub query: QueryConfig,

    /// Monitoring and observability
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineConfig {
    /// How content hashes map to partitions
    #[serde(default)]
    pub partition_policy: PartitionPolicy,

    /// How query results are bucketed
    #[serde(default)]
    pub grouping_policy: GroupingPolicy,

    /// Expected number of distinct dimension names
    #[serde(default = "default_dimension_capacity")]
    pub dimension_capacity: usize,

    /// Expected number of distinct values per dimension
    #[serde(default = "default_value_capacity")]
    pub value_capacity: usize,

    /// Longest accepted dimension name in bytes (validated increments)
    #[serde(default = "default_max_name_length")]
    pub max_dimension_name_length: usize,

    /// Longest accepted dimension value in bytes (validated increments)
    #[serde(default = "default_max_value_length")]
    pub max_dimension_value_length: usize,
}

/// Query configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct QueryConfig {
    /// Scan partitions on the rayon pool
    #[serde(default = "default_true")]
    pub parallel: bool,
}

/// Monitoring configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Record Prometheus metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Log level (error, warn, info, debug, trace) or `EnvFilter` directive
    ///
    /// The library only emits `tracing` events and never reads this value.
    /// It is meant for the host application's `tracing_subscriber::EnvFilter`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions
fn default_dimension_capacity() -> usize { 100 }
fn default_value_capacity() -> usize { 1000 }
fn default_max_name_length() -> usize { MAX_DIMENSION_NAME_LENGTH }
fn default_max_value_length() -> usize { MAX_DIMENSION_VALUE_LENGTH }
fn default_log_level() -> String { "info".to_string() }
fn default_true() -> bool { true }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            partition_policy: PartitionPolicy::default(),
            grouping_policy: GroupingPolicy::default(),
            dimension_capacity: default_dimension_capacity(),
            value_capacity: default_value_capacity(),
            max_dimension_name_length: default_max_name_length(),
            max_dimension_value_length: default_max_value_length(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { parallel: true }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Parse configuration from TOML text
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| Error::Configuration(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    ///
    /// Unparseable values are ignored and the current setting is kept.
    pub fn apply_env_overrides(&mut self) {
        // Engine
        if let Ok(policy) = std::env::var("COUNTER_PARTITION_POLICY") {
            if let Ok(p) = policy.parse() {
                self.engine.partition_policy = p;
            }
        }
        if let Ok(policy) = std::env::var("COUNTER_GROUPING_POLICY") {
            if let Ok(p) = policy.parse() {
                self.engine.grouping_policy = p;
            }
        }

        // Query
        if let Ok(parallel) = std::env::var("COUNTER_QUERY_PARALLEL") {
            if let Ok(p) = parallel.parse() {
                self.query.parallel = p;
            }
        }

        // Monitoring
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.monitoring.log_level = log_level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.engine.max_dimension_name_length == 0 {
            return Err(Error::Configuration(
                "Max dimension name length must be > 0".to_string(),
            ));
        }
        if self.engine.max_dimension_value_length == 0 {
            return Err(Error::Configuration(
                "Max dimension value length must be > 0".to_string(),
            ));
        }
        if self.engine.dimension_capacity > u32::MAX as usize {
            return Err(ValidationError::OutOfRange {
                field: "engine.dimension_capacity".to_string(),
                value: self.engine.dimension_capacity.to_string(),
                min: "0".to_string(),
                max: u32::MAX.to_string(),
            }
            .into());
        }

        const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
        let level = self.monitoring.log_level.to_ascii_lowercase();
        // Full EnvFilter directives ("kuba_counter=debug,warn") are passed through
        if !level.contains('=') && !level.contains(',') && !LEVELS.contains(&level.as_str()) {
            return Err(ValidationError::InvalidFormat {
                field: "monitoring.log_level".to_string(),
                message: format!("unknown level '{}'", self.monitoring.log_level),
            }
            .into());
        }

        Ok(())
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Configuration(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.engine.partition_policy, PartitionPolicy::LowBits);
        assert_eq!(config.engine.grouping_policy, GroupingPolicy::Value);
        assert_eq!(config.engine.max_dimension_name_length, 256);
        assert!(config.query.parallel);
        assert!(config.monitoring.metrics_enabled);
    }

    #[test]
    fn test_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_limits() {
        let mut config = Config::default();
        config.engine.max_dimension_value_length = 0;
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_log_level_validation() {
        let mut config = Config::default();
        config.monitoring.log_level = "loud".to_string();
        assert!(matches!(
            config.validate(),
            Err(Error::Validation(ValidationError::InvalidFormat { .. }))
        ));

        config.monitoring.log_level = "kuba_counter=debug,warn".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = Config::from_str(
            r#"
            [engine]
            partition_policy = "most_significant_bit"

            [query]
            parallel = false
            "#,
        )
        .unwrap();

        assert_eq!(
            config.engine.partition_policy,
            PartitionPolicy::MostSignificantBit
        );
        assert_eq!(config.engine.grouping_policy, GroupingPolicy::Value);
        assert_eq!(config.engine.value_capacity, 1000);
        assert!(!config.query.parallel);
        assert_eq!(config.monitoring.log_level, "info");
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(Config::from_str("").unwrap(), Config::default());
    }

    #[test]
    fn test_bad_policy_is_rejected() {
        let result = Config::from_str("[engine]\ngrouping_policy = \"sideways\"\n");
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("COUNTER_GROUPING_POLICY", "presence");
        std::env::set_var("COUNTER_QUERY_PARALLEL", "not-a-bool");
        let config = Config::from_env();
        assert_eq!(config.engine.grouping_policy, GroupingPolicy::Presence);
        assert!(config.query.parallel);
        std::env::remove_var("COUNTER_GROUPING_POLICY");
        std::env::remove_var("COUNTER_QUERY_PARALLEL");
    }
}
