//! Client configuration.

use serde::{Deserialize, Serialize};

/// Options applied to every query and mutation of a client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Log every statement through `tracing` at debug level.
    pub debug: bool,
    /// Include bound arguments in statement logs.
    pub log_args: bool,
    /// Apply DISTINCT to queries that did not choose explicitly.
    pub unique_by_default: bool,
}

impl ClientConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON; missing keys take defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_log_args(mut self, log_args: bool) -> Self {
        self.log_args = log_args;
        self
    }

    pub fn with_unique_by_default(mut self, unique: bool) -> Self {
        self.unique_by_default = unique;
        self
    }
}
