//! Core runtime configuration.
//!
//! # Responsibility
//! - Describe the knobs hosts pass to the core (database, logging, batching).
//! - Load them from JSON files and reject inconsistent values early.
//!
//! # Invariants
//! - A validated config always carries a batch limit the store accepts.

use crate::logging::{default_log_level, normalize_level};
use crate::repo::document_store::MAX_IN_VALUES;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config JSON: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
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

/// Core settings. Every field is optional in the JSON source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    /// SQLite file; `None` keeps the store in memory.
    pub db_path: Option<PathBuf>,
    pub log_level: String,
    /// Absolute directory for rolling log files; `None` disables file logging.
    pub log_dir: Option<String>,
    /// Person ids per recap membership query.
    pub query_batch_limit: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            log_level: default_log_level().to_string(),
            log_dir: None,
            query_batch_limit: MAX_IN_VALUES,
        }
    }
}

impl CoreConfig {
    /// Reads and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json_str(&text)?;
        // Relative database paths resolve against the config file.
        if let Some(db_path) = config.db_path.take() {
            let resolved = match (db_path.is_relative(), path.parent()) {
                (true, Some(base)) => base.join(db_path),
                _ => db_path,
            };
            config.db_path = Some(resolved);
        }
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.query_batch_limit == 0 || self.query_batch_limit > MAX_IN_VALUES {
            return Err(ConfigError::Invalid(format!(
                "query_batch_limit must be within 1..={MAX_IN_VALUES}, got {}",
                self.query_batch_limit
            )));
        }
        normalize_level(&self.log_level).map_err(ConfigError::Invalid)?;
        if let Some(log_dir) = &self.log_dir {
            if !Path::new(log_dir.trim()).is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "log_dir must be an absolute path, got `{log_dir}`"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, CoreConfig};
    use crate::logging::default_log_level;

    #[test]
    fn empty_object_uses_defaults() {
        let config = CoreConfig::from_json_str("{}").unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.query_batch_limit, 30);
        assert_eq!(config.log_level, default_log_level());
    }

    #[test]
    fn rejects_out_of_range_batch_limit() {
        let err = CoreConfig::from_json_str(r#"{"query_batch_limit": 31}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("31")));
    }

    #[test]
    fn rejects_unknown_level_and_fields() {
        assert!(matches!(
            CoreConfig::from_json_str(r#"{"log_level": "loud"}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            CoreConfig::from_json_str(r#"{"db": "x"}"#),
            Err(ConfigError::Parse(_))
        ));
    }
}
