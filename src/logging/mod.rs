//! Logging initialisation.
//!
//! The crate logs through the `log` facade; this module installs an
//! `env_logger` backend configured from [`LogConfig`].

pub mod config;

pub use config::LogConfig;

use log::LevelFilter;
use once_cell::sync::OnceCell;

static INITIALIZED: OnceCell<LevelFilter> = OnceCell::new();

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    #[error("Failed to install logger: {0}")]
    Init(String),
}

pub struct LoggingSystem;

impl LoggingSystem {
    /// Installs the logger. Later calls are no-ops and report the level that
    /// was installed first.
    pub fn init(config: &LogConfig) -> Result<LevelFilter, LoggingError> {
        let level = INITIALIZED.get_or_try_init(|| {
            let level = parse_level(&config.default_level)?;
            let mut builder = env_logger::Builder::new();
            builder.filter_level(level);
            for (module, module_level) in &config.features {
                builder.filter_module(module, parse_level(module_level)?);
            }
            if !config.timestamps {
                builder.format_timestamp(None);
            }
            builder
                .try_init()
                .map_err(|e| LoggingError::Init(e.to_string()))?;
            Ok::<_, LoggingError>(level)
        })?;
        Ok(*level)
    }

    /// Initialises with the default configuration.
    pub fn init_default() -> Result<LevelFilter, LoggingError> {
        Self::init(&LogConfig::default())
    }
}

/// Maps a level name to a [`LevelFilter`].
pub fn parse_level(level: &str) -> Result<LevelFilter, LoggingError> {
    match level.to_ascii_uppercase().as_str() {
        "TRACE" => Ok(LevelFilter::Trace),
        "DEBUG" => Ok(LevelFilter::Debug),
        "INFO" => Ok(LevelFilter::Info),
        "WARN" => Ok(LevelFilter::Warn),
        "ERROR" => Ok(LevelFilter::Error),
        "OFF" => Ok(LevelFilter::Off),
        _ => Err(LoggingError::InvalidLevel(level.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names() {
        assert_eq!(parse_level("debug").unwrap(), LevelFilter::Debug);
        assert_eq!(parse_level("WARN").unwrap(), LevelFilter::Warn);
        assert!(parse_level("LOUD").is_err());
    }

    #[test]
    fn init_is_idempotent() {
        let first = LoggingSystem::init(&LogConfig::default().with_level("WARN")).unwrap();
        let second = LoggingSystem::init(&LogConfig::default().with_level("TRACE")).unwrap();
        assert_eq!(first, second);
    }
}
