//! Registry tuning knobs

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Backing slots allowed per live listener before a table is rebuilt
pub const DEFAULT_COMPACTION_RATIO: usize = 2;

fn default_compaction_ratio() -> usize {
    DEFAULT_COMPACTION_RATIO
}

/// Configuration shared by every table a dispatcher creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// A table is compacted once `backing slots > compaction_ratio * live listeners`
    #[serde(default = "default_compaction_ratio")]
    pub compaction_ratio: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            compaction_ratio: default_compaction_ratio(),
        }
    }
}

impl RegistryConfig {
    /// Builder-style override of the compaction ratio
    pub fn with_compaction_ratio(mut self, ratio: usize) -> Self {
        self.compaction_ratio = ratio;
        self
    }

    /// Rejects a compaction ratio of zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.compaction_ratio == 0 {
            return Err(ConfigError::Invalid(
                "compaction_ratio must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
