//! Layered configuration loading: defaults → project YAML → local YAML
//! override → environment (highest priority), via `figment`.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::EngineConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid log level: {0}. must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("invalid log format: {0}. must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("database path cannot be empty")]
    EmptyDatabasePath,

    #[error("invalid max_connections: {0}. must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("invalid pause_timeout_seconds: {0}. must be at least 1")]
    InvalidPauseTimeout(u64),

    #[error("invalid stats_sample_interval_seconds: {0}. must be at least 1")]
    InvalidSampleInterval(u64),

    #[error("invalid stall_threshold_minutes: {0}. must be at least 1")]
    InvalidStallThreshold(u64),

    #[error("invalid scheduler_tick_seconds: {0}. must be at least 1")]
    InvalidSchedulerTick(u64),
}

/// Layered configuration loader.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (`Serialized`)
    /// 2. `.chintai/config.yaml` (project config)
    /// 3. `.chintai/local.yaml` (project-local overrides, optional)
    /// 4. Environment variables (`CHINTAI_` prefix, highest priority)
    pub fn load() -> Result<EngineConfig> {
        let config: EngineConfig = Figment::new()
            .merge(Serialized::defaults(EngineConfig::default()))
            .merge(Yaml::file(".chintai/config.yaml"))
            .merge(Yaml::file(".chintai/local.yaml"))
            .merge(Env::prefixed("CHINTAI_").split("__"))
            .extract()
            .context("failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, defaults still applied underneath.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<EngineConfig> {
        let config: EngineConfig = Figment::new()
            .merge(Serialized::defaults(EngineConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!("failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &EngineConfig) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.pause_timeout_seconds == 0 {
            return Err(ConfigError::InvalidPauseTimeout(config.pause_timeout_seconds));
        }
        if config.stats_sample_interval_seconds == 0 {
            return Err(ConfigError::InvalidSampleInterval(config.stats_sample_interval_seconds));
        }
        if config.stall_threshold_minutes == 0 {
            return Err(ConfigError::InvalidStallThreshold(config.stall_threshold_minutes));
        }
        if config.scheduler_tick_seconds == 0 {
            return Err(ConfigError::InvalidSchedulerTick(config.scheduler_tick_seconds));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.database.path, ".chintai/chintai.db");
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("default config should be valid");
    }

    #[test]
    fn yaml_overrides_merge_over_defaults() {
        let yaml = r"
pause_timeout_seconds: 60
logging:
  level: debug
  format: pretty
";
        let config: EngineConfig = Figment::new()
            .merge(Serialized::defaults(EngineConfig::default()))
            .merge(Yaml::string(yaml))
            .extract()
            .unwrap();

        assert_eq!(config.pause_timeout_seconds, 60);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "pretty");
        // Untouched defaults survive the merge.
        assert_eq!(config.stall_threshold_minutes, 30);
        ConfigLoader::validate(&config).expect("merged config should be valid");
    }

    #[test]
    fn rejects_unknown_log_level() {
        let mut config = EngineConfig::default();
        config.logging.level = "verbose".to_string();
        let err = ConfigLoader::validate(&config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLogLevel(_)));
    }

    #[test]
    fn rejects_empty_database_path() {
        let mut config = EngineConfig::default();
        config.database.path = String::new();
        let err = ConfigLoader::validate(&config).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyDatabasePath));
    }

    #[test]
    fn rejects_zero_pause_timeout() {
        let mut config = EngineConfig::default();
        config.pause_timeout_seconds = 0;
        let err = ConfigLoader::validate(&config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPauseTimeout(0)));
    }

    #[test]
    #[allow(unsafe_code)]
    fn env_override_takes_precedence_over_yaml() {
        // SAFETY: test-local key, no other test reads or writes it concurrently.
        unsafe {
            std::env::set_var("CHINTAI_TEST_ENV_OVERRIDE_PAUSE_TIMEOUT_SECONDS", "90");
        }

        let yaml = "pause_timeout_seconds: 60\n";
        let config: EngineConfig = Figment::new()
            .merge(Serialized::defaults(EngineConfig::default()))
            .merge(Yaml::string(yaml))
            .merge(Env::prefixed("CHINTAI_TEST_ENV_OVERRIDE_").split("__"))
            .extract()
            .unwrap();

        unsafe {
            std::env::remove_var("CHINTAI_TEST_ENV_OVERRIDE_PAUSE_TIMEOUT_SECONDS");
        }

        assert_eq!(config.pause_timeout_seconds, 90);
    }
}
