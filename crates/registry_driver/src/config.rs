//! Configuration management for the registry driver.
//!
//! Loads and validates the TOML configuration file and applies command-line
//! overrides on top of it.

use crate::cli::CliArgs;
use crate::error::DriverError;
use listener_registry::RegistryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Driver configuration loaded from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Registry tuning passed to every dispatcher the driver builds
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Workload sizes
    #[serde(default)]
    pub workload: WorkloadSettings,
}

/// Logging configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

fn default_normal_listeners() -> usize {
    50_000
}

fn default_deferred_listeners() -> usize {
    50_000
}

fn default_churn_rounds() -> usize {
    10
}

fn default_weak_fraction() -> f64 {
    0.5
}

/// Sizes of the fanout and churn workloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSettings {
    /// Normal-tier listeners registered by the fanout workload, and per churn round
    #[serde(default = "default_normal_listeners")]
    pub normal_listeners: usize,
    /// Deferred-tier listeners registered by the fanout workload
    #[serde(default = "default_deferred_listeners")]
    pub deferred_listeners: usize,
    /// Add/remove rounds performed by the churn workload
    #[serde(default = "default_churn_rounds")]
    pub churn_rounds: usize,
    /// Share of churn registrations made weak, in [0, 1]
    #[serde(default = "default_weak_fraction")]
    pub weak_fraction: f64,
}

impl Default for WorkloadSettings {
    fn default() -> Self {
        Self {
            normal_listeners: default_normal_listeners(),
            deferred_listeners: default_deferred_listeners(),
            churn_rounds: default_churn_rounds(),
            weak_fraction: default_weak_fraction(),
        }
    }
}

impl DriverConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, a default configuration file is written at
    /// the specified path and the default configuration is returned.
    pub fn load_from_file(path: &Path) -> Result<Self, DriverError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: DriverConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = DriverConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            std::fs::write(path, toml_content)?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Applies command-line overrides.
    pub fn apply_overrides(&mut self, args: &CliArgs) {
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if args.json_logs {
            self.logging.json_format = true;
        }
        if let Some(listeners) = args.listeners {
            self.workload.normal_listeners = listeners;
        }
        if let Some(deferred) = args.deferred {
            self.workload.deferred_listeners = deferred;
        }
        if let Some(rounds) = args.rounds {
            self.workload.churn_rounds = rounds;
        }
    }

    /// Validates the configuration for consistency and correctness.
    pub fn validate(&self) -> Result<(), DriverError> {
        self.registry.validate()?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(DriverError::InvalidConfig(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            )));
        }

        if !(0.0..=1.0).contains(&self.workload.weak_fraction) {
            return Err(DriverError::InvalidConfig(format!(
                "workload.weak_fraction must be within [0, 1], got {}",
                self.workload.weak_fraction
            )));
        }

        Ok(())
    }
}
