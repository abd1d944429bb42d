//! Runtime configuration for the vector cluster store.
//!
//! Tunables layered via [`figment`]: built-in defaults, overridden by an
//! optional TOML file, overridden by `VSTORE_`-prefixed environment
//! variables. None of this is part of the on-device format (see
//! [`crate::layout`]); it governs only how *this process* behaves against a
//! store it opens.
//!
//! # Priority (highest to lowest)
//!
//! 1. Environment variables (`VSTORE_*`)
//! 2. Configuration file
//! 3. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to parse configuration from its source.
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    /// A configuration value failed its range check.
    #[error("invalid configuration value for '{key}': {message}")]
    InvalidValue {
        /// Configuration key that failed validation.
        key: String,
        /// Validation error message.
        message: String,
    },
}

/// Runtime configuration for a [`crate::store::Store`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum length, in bytes, of a vector's opaque metadata.
    pub max_metadata_len: usize,
    /// Fraction of clusters probed per similarity query, in `(0.0, 1.0]`.
    pub probe_fraction: f32,
    /// Maximum Lloyd iterations a k-means run performs before stopping.
    pub kmeans_max_iterations: usize,
    /// Centroid-movement tolerance below which k-means is considered converged.
    pub kmeans_tolerance: f32,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_metadata_len: 4096,
            probe_fraction: 0.5,
            kmeans_max_iterations: 100,
            kmeans_tolerance: 1e-4,
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace.
    pub level: String,
    /// Path of the dedicated append-only log file. Empty disables the
    /// dedicated sink; `tracing` events are still emitted either way.
    pub file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: String::new(),
        }
    }
}

impl StoreConfig {
    /// Loads configuration from `vcts.toml` in the current directory, if
    /// present, layered with environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("vcts.toml")
    }

    /// Loads configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("VSTORE_").split("_").lowercase(false));

        figment.extract().map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Builds a configuration from a TOML string, useful for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if `toml_str` cannot be parsed.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml_str));

        figment.extract().map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Validates the configuration, rejecting values that would make the
    /// store or the k-means kernel misbehave.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid field encountered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_metadata_len == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_metadata_len".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        if !(self.probe_fraction > 0.0 && self.probe_fraction <= 1.0) {
            return Err(ConfigError::InvalidValue {
                key: "probe_fraction".to_string(),
                message: format!("value {} is out of range (0.0, 1.0]", self.probe_fraction),
            });
        }

        if self.kmeans_max_iterations == 0 {
            return Err(ConfigError::InvalidValue {
                key: "kmeans_max_iterations".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        if !(self.kmeans_tolerance > 0.0) {
            return Err(ConfigError::InvalidValue {
                key: "kmeans_tolerance".to_string(),
                message: format!("value {} must be positive", self.kmeans_tolerance),
            });
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.level".to_string(),
                message: format!(
                    "value '{}' is invalid, expected one of: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        Ok(())
    }

    /// Serializes the configuration to TOML, mainly for diagnostics.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
