//! Runtime configuration for the state manager

use crate::types::{ReactiveError, ReactiveResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix of environment variables overriding configuration keys,
/// e.g. `SYNAPSED_REACTIVE_EVENT_BUFFER=512`
pub const ENV_PREFIX: &str = "SYNAPSED_REACTIVE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactiveConfig {
    /// Capacity of the broadcast channel behind `StateManager::events`
    pub event_buffer: usize,
    /// Entries kept by the default error log
    pub error_log_capacity: usize,
    /// Emit a change from `Undefined` to the current value when a slot is
    /// first watched
    pub emit_initial_value: bool,
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        Self {
            event_buffer: 256,
            error_log_capacity: 100,
            emit_initial_value: true,
        }
    }
}

impl ReactiveConfig {
    /// Defaults overridden by environment variables
    pub fn load() -> ReactiveResult<Self> {
        Self::build(None)
    }

    /// Defaults overridden by a TOML file, then by environment variables
    pub fn from_file(path: impl AsRef<Path>) -> ReactiveResult<Self> {
        Self::build(Some(path.as_ref()))
    }

    fn build(path: Option<&Path>) -> ReactiveResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config: Self = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ReactiveResult<()> {
        if self.event_buffer == 0 {
            return Err(ReactiveError::Config(
                "event_buffer must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ReactiveConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.emit_initial_value);
        assert_eq!(config.event_buffer, 256);
    }

    #[test]
    fn test_from_file_overrides_some_keys() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "event_buffer = 8").unwrap();
        writeln!(file, "emit_initial_value = false").unwrap();

        let config = ReactiveConfig::from_file(file.path()).unwrap();
        assert_eq!(config.event_buffer, 8);
        assert!(!config.emit_initial_value);
        assert_eq!(config.error_log_capacity, 100);
    }

    #[test]
    fn test_zero_buffer_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "event_buffer = 0").unwrap();

        let err = ReactiveConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ReactiveError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReactiveConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ReactiveError::Config(_)));
    }
}
