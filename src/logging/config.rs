use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// One of TRACE, DEBUG, INFO, WARN, ERROR.
    pub default_level: String,
    /// Per-module overrides, e.g. `"rectus::migration" = "DEBUG"`.
    pub features: HashMap<String, String>,
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: "INFO".to_string(),
            features: HashMap::new(),
            timestamps: true,
        }
    }
}

impl LogConfig {
    pub fn with_level(mut self, level: &str) -> Self {
        self.default_level = level.to_string();
        self
    }

    pub fn with_feature_level(mut self, module: &str, level: &str) -> Self {
        self.features.insert(module.to_string(), level.to_string());
        self
    }
}
