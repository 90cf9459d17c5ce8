//! Session-level engine settings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_MAX_DEPTH: usize = 512;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Cannot parse engine config: {0}")]
    Parse(String),
    #[error("Invalid engine config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of nested requests before evaluation gives up.
    pub max_depth: usize,
    /// Record dependency edges so the evaluation can be rendered as a tree.
    pub trace: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_depth: DEFAULT_MAX_DEPTH, trace: false }
    }
}

impl EngineConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_depth == 0 {
            return Err(ConfigError::Invalid("max_depth must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}
