use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid default_interval_ms: must be greater than 0")]
    ZeroInterval,

    #[error("Invalid max_transient_retries: {0}. Must be at most 10")]
    InvalidTransientRetries(u32),

    #[error("Invalid backoff configuration: base_ms ({0}) must be positive and less than max_delay_ms ({1})")]
    InvalidBackoff(u64, u64),

    #[error("Invalid failure_threshold: must be at least 1")]
    InvalidFailureThreshold,

    #[error("Invalid cooldown_secs: must be greater than 0")]
    InvalidCooldown,

    #[error("Invalid watchdog timing: stall_threshold_secs ({1}) must be greater than scan_interval_secs ({0}), which must be positive")]
    InvalidWatchdog(u64, u64),

    #[error("Invalid {name} threshold: {value}. Must be in (0.0, 1.0]")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Service base_url cannot be empty")]
    EmptyServiceUrl,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration relative to the working directory.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. .modforge/config.yaml
    /// 3. .modforge/local.yaml
    /// 4. Environment variables (MODFORGE_* prefix, `__` separates sections)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(Path::new("."))
    }

    /// Load configuration with `root` standing in for the working directory.
    pub fn load_from_dir(root: &Path) -> Result<Config> {
        let config_dir = root.join(".modforge");
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(config_dir.join("config.yaml")))
            .merge(Yaml::file(config_dir.join("local.yaml")))
            .merge(Env::prefixed("MODFORGE_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, without environment overrides.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.scheduler.default_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if config.scheduler.max_transient_retries > 10 {
            return Err(ConfigError::InvalidTransientRetries(config.scheduler.max_transient_retries));
        }

        let backoff = &config.backoff;
        if backoff.base_ms == 0 || backoff.base_ms >= backoff.max_delay_ms {
            return Err(ConfigError::InvalidBackoff(backoff.base_ms, backoff.max_delay_ms));
        }

        if config.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::InvalidFailureThreshold);
        }
        if config.circuit_breaker.cooldown_secs == 0 {
            return Err(ConfigError::InvalidCooldown);
        }

        let watchdog = &config.watchdog;
        if watchdog.scan_interval_secs == 0 || watchdog.stall_threshold_secs <= watchdog.scan_interval_secs {
            return Err(ConfigError::InvalidWatchdog(
                watchdog.scan_interval_secs,
                watchdog.stall_threshold_secs,
            ));
        }

        let patterns = &config.patterns;
        for (name, value) in [
            ("generation", patterns.generation_threshold),
            ("fix", patterns.fix_threshold),
            ("aggressive fix", patterns.aggressive_fix_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::InvalidThreshold { name, value });
            }
        }

        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        if config.service.base_url.trim().is_empty() {
            return Err(ConfigError::EmptyServiceUrl);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.scheduler.default_interval_ms, 300_000);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.database.path, ".modforge/modforge.db");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
scheduler:
  default_interval_ms: 60000
circuit_breaker:
  failure_threshold: 3
patterns:
  enabled: false
logging:
  level: debug
  format: json
";
        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");
        assert_eq!(config.scheduler.default_interval_ms, 60_000);
        assert_eq!(config.scheduler.max_transient_retries, 3);
        assert_eq!(config.circuit_breaker.failure_threshold, 3);
        assert_eq!(config.circuit_breaker.cooldown_secs, 3600);
        assert!(!config.patterns.enabled);
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_local_overrides_project_config() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join(".modforge");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("config.yaml"), "watchdog:\n  scan_interval_secs: 60\n  stall_threshold_secs: 600\n").unwrap();
        fs::write(dir.join("local.yaml"), "watchdog:\n  stall_threshold_secs: 120\n").unwrap();

        let config = ConfigLoader::load_from_dir(root.path()).unwrap();
        assert_eq!(config.watchdog.scan_interval_secs, 60);
        assert_eq!(config.watchdog.stall_threshold_secs, 120);
    }

    #[test]
    fn test_env_overrides_files() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join(".modforge");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("config.yaml"), "circuit_breaker:\n  failure_threshold: 3\n").unwrap();

        temp_env::with_var("MODFORGE_CIRCUIT_BREAKER__FAILURE_THRESHOLD", Some("7"), || {
            let config = ConfigLoader::load_from_dir(root.path()).unwrap();
            assert_eq!(config.circuit_breaker.failure_threshold, 7);
            assert_eq!(config.circuit_breaker.cooldown_secs, 3600);
        });
    }

    #[test]
    fn test_load_from_file_rejects_invalid() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("bad.yaml");
        fs::write(&path, "patterns:\n  fix_threshold: 1.5\n").unwrap();
        assert!(ConfigLoader::load_from_file(&path).is_err());
    }

    #[test]
    fn test_validation_errors() {
        let mut config = Config::default();
        config.scheduler.default_interval_ms = 0;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::ZeroInterval)));

        let mut config = Config::default();
        config.backoff.base_ms = 120_000;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidBackoff(_, _))));

        let mut config = Config::default();
        config.circuit_breaker.failure_threshold = 0;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidFailureThreshold)));

        let mut config = Config::default();
        config.patterns.generation_threshold = -0.1;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidThreshold { .. })));

        let mut config = Config::default();
        config.patterns.fix_threshold = 0.0;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidThreshold { .. })));

        let mut config = Config::default();
        config.watchdog.stall_threshold_secs = config.watchdog.scan_interval_secs;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidWatchdog(_, _))));

        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidLogLevel(_))));

        let mut config = Config::default();
        config.logging.rotation = "weekly".to_string();
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidRotation(_))));
    }
}
