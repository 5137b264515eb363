//! Engine configuration.
//!
//! Loaded from TOML or JSON, with every section optional, then overridden
//! from `RECTUS_STORAGE_PATH`, `RECTUS_ENV` and `RECTUS_LOG`.

use crate::error::{RectusError, RectusResult};
use crate::logging::LogConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const ENV_STORAGE_PATH: &str = "RECTUS_STORAGE_PATH";
pub const ENV_ENVIRONMENT: &str = "RECTUS_ENV";
pub const ENV_LOG_LEVEL: &str = "RECTUS_LOG";

/// Deployment environment. Destructive migration commands are refused in
/// production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Test => "test",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = RectusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            "production" | "prod" => Ok(Self::Production),
            other => Err(RectusError::config(format!(
                "unknown environment '{}'",
                other
            ))),
        }
    }
}

/// Migration lock settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// A lease older than this may be taken over.
    pub lock_lease_secs: u64,
    /// How long to wait for the lock before giving up.
    pub lock_timeout_secs: u64,
    pub lock_poll_millis: u64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            lock_lease_secs: 300,
            lock_timeout_secs: 60,
            lock_poll_millis: 100,
        }
    }
}

impl MigrationConfig {
    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lock_lease_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock_poll_millis)
    }
}

/// Retry settings for registry reloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub reload_max_attempts: u32,
    pub reload_base_delay_millis: u64,
    pub reload_max_delay_millis: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            reload_max_attempts: 4,
            reload_base_delay_millis: 25,
            reload_max_delay_millis: 1_000,
        }
    }
}

/// Configuration for a [`RectusEngine`](crate::RectusEngine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory of the sled database
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
    #[serde(default)]
    pub environment: Environment,
    /// Use an in-memory database that is removed on drop
    #[serde(default)]
    pub temporary: bool,
    #[serde(default)]
    pub migration: MigrationConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub logging: LogConfig,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("data")
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            environment: Environment::default(),
            temporary: false,
            migration: MigrationConfig::default(),
            registry: RegistryConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Create a new engine configuration with the specified storage path
    pub fn new(storage_path: PathBuf) -> Self {
        Self {
            storage_path,
            ..Default::default()
        }
    }

    /// A throwaway configuration backed by a temporary database
    pub fn temporary() -> Self {
        Self {
            temporary: true,
            environment: Environment::Test,
            ..Default::default()
        }
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_migration(mut self, migration: MigrationConfig) -> Self {
        self.migration = migration;
        self
    }

    /// Applies `RECTUS_*` overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> RectusResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_STORAGE_PATH) {
            self.storage_path = PathBuf::from(path);
        }
        if let Some(env) = lookup(ENV_ENVIRONMENT) {
            self.environment = env.parse()?;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.logging.default_level = level;
        }
        Ok(())
    }
}

/// Parses configuration text. JSON is used when `path` ends in `.json`,
/// TOML otherwise.
pub fn parse_config(path: &Path, text: &str) -> RectusResult<EngineConfig> {
    let is_json = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(text)
            .map_err(|e| RectusError::config(format!("Invalid JSON in {}: {}", path.display(), e)))
    } else {
        Ok(toml::from_str(text)?)
    }
}

/// Loads the configuration from `path` (or defaults) and applies the
/// environment overrides.
pub fn load_config(path: Option<&Path>) -> RectusResult<EngineConfig> {
    let mut config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| {
                RectusError::config(format!("Failed to read {}: {}", path.display(), e))
            })?;
            parse_config(path, &text)?
        }
        None => EngineConfig::default(),
    };
    config.apply_overrides(|key| std::env::var(key).ok())?;
    Ok(config)
}
