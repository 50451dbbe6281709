//! Error types for the registry driver

use listener_registry::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to write configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to encode report: {0}")]
    Report(#[from] serde_json::Error),

    #[error(transparent)]
    Registry(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    InvalidConfig(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Workload '{workload}' failed verification: {reason}")]
    Verification { workload: String, reason: String },
}
