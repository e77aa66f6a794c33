//! Engine configuration.
//!
//! # Responsibility
//! - Describe where the document store lives and how the sync layer behaves.
//! - Load settings from JSON with defaults for every omitted field.
//!
//! # Invariants
//! - A validated config never has a zero debounce window or watch limit.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_DEBOUNCE_WINDOW_MS: u64 = 300;
const DEFAULT_MAX_WATCHES_PER_SUBSCRIBER: usize = 64;

/// Configuration loading/validation failures.
#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid engine config: {err}"),
            Self::Invalid(message) => write!(f, "invalid engine config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Backing storage for the document store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DatabaseLocation {
    /// Private in-memory database, lost on drop.
    #[default]
    Memory,
    /// SQLite file, created when missing.
    File { path: PathBuf },
}

/// File logging settings passed to [`crate::logging::init_logging`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSettings {
    /// One of `trace|debug|info|warn|error`.
    pub level: String,
    /// Absolute directory for rolling log files.
    pub dir: PathBuf,
}

/// Settings for [`crate::engine::DocumentEngine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub database: DatabaseLocation,
    /// Window in which content submits for one document are coalesced.
    pub debounce_window_ms: u64,
    pub max_watches_per_subscriber: usize,
    /// File logging is left untouched when `None`.
    pub log: Option<LogSettings>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database: DatabaseLocation::Memory,
            debounce_window_ms: DEFAULT_DEBOUNCE_WINDOW_MS,
            max_watches_per_subscriber: DEFAULT_MAX_WATCHES_PER_SUBSCRIBER,
            log: None,
        }
    }
}

impl EngineConfig {
    /// In-memory store with default sync settings.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// File-backed store with default sync settings.
    pub fn with_file(path: impl Into<PathBuf>) -> Self {
        Self {
            database: DatabaseLocation::File { path: path.into() },
            ..Self::default()
        }
    }

    pub fn with_debounce_window(mut self, window: Duration) -> Self {
        self.debounce_window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Parses and validates a JSON config document.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce_window_ms == 0 {
            return Err(ConfigError::Invalid(
                "debounce_window_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_watches_per_subscriber == 0 {
            return Err(ConfigError::Invalid(
                "max_watches_per_subscriber must be greater than zero".to_string(),
            ));
        }
        if let DatabaseLocation::File { path } = &self.database {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(
                    "database path must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, DatabaseLocation, EngineConfig};
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn empty_json_yields_defaults() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.database, DatabaseLocation::Memory);
        assert_eq!(config.debounce_window(), Duration::from_millis(300));
    }

    #[test]
    fn file_database_and_overrides_parse() {
        let config = EngineConfig::from_json_str(
            r#"{
                "database": { "kind": "file", "path": "/var/lib/pagetree/docs.sqlite3" },
                "debounce_window_ms": 120,
                "max_watches_per_subscriber": 8
            }"#,
        )
        .unwrap();
        assert_eq!(
            config.database,
            DatabaseLocation::File {
                path: PathBuf::from("/var/lib/pagetree/docs.sqlite3")
            }
        );
        assert_eq!(config.debounce_window_ms, 120);
        assert_eq!(config.max_watches_per_subscriber, 8);
    }

    #[test]
    fn zero_window_is_rejected() {
        let err = EngineConfig::from_json_str(r#"{ "debounce_window_ms": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("debounce")));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = EngineConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
