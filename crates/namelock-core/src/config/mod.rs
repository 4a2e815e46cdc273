//! Configuration management with file persistence
//!
//! Values are read from a TOML file and can be overridden from the
//! environment. Lookup order for the file:
//! 1. `$NAMELOCK_CONFIG`
//! 2. `<config dir>/namelock/config.toml`
//! 3. built-in defaults

use crate::domain::locking::LockConfig;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable pointing at an explicit config file
pub const CONFIG_PATH_ENV: &str = "NAMELOCK_CONFIG";
/// Overrides `locks.tick_interval_ms`
pub const TICK_MS_ENV: &str = "NAMELOCK_TICK_MS";
/// Overrides `locks.reaper_interval_ms`
pub const REAPER_MS_ENV: &str = "NAMELOCK_REAPER_MS";

/// Namelock configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub locks: LocksConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocksConfig {
    pub tick_interval_ms: u64,
    pub reaper_interval_ms: u64,
    pub event_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `tracing` filter directive when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LocksConfig {
    fn default() -> Self {
        let defaults = LockConfig::default();
        Self {
            tick_interval_ms: defaults.tick_interval.as_millis() as u64,
            reaper_interval_ms: defaults.reaper_interval.as_millis() as u64,
            event_capacity: defaults.event_capacity,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "namelock=info".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            locks: LocksConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Keys understood by `get` and `set`
pub const KEYS: &[&str] = &[
    "locks.tick_interval_ms",
    "locks.reaper_interval_ms",
    "locks.event_capacity",
    "logging.filter",
];

impl Config {
    /// Get the config file path
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(custom) = env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(custom));
        }
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::ConfigError("Could not determine config directory".to_string()))?;
        Ok(dir.join("namelock").join("config.toml"))
    }

    /// Load configuration from the default location with environment
    /// overrides applied. A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Config::default()
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents).map_err(|source| Error::ConfigParse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply `NAMELOCK_TICK_MS` and `NAMELOCK_REAPER_MS`
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(value) = env::var(TICK_MS_ENV) {
            self.set("locks.tick_interval_ms", &value)?;
        }
        if let Ok(value) = env::var(REAPER_MS_ENV) {
            self.set("locks.reaper_interval_ms", &value)?;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.lock_config().validate()?;
        Ok(())
    }

    /// Lock manager settings described by this configuration
    pub fn lock_config(&self) -> LockConfig {
        LockConfig::default()
            .with_tick_interval(Duration::from_millis(self.locks.tick_interval_ms))
            .with_reaper_interval(Duration::from_millis(self.locks.reaper_interval_ms))
            .with_event_capacity(self.locks.event_capacity)
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> Result<String> {
        match key {
            "locks.tick_interval_ms" => Ok(self.locks.tick_interval_ms.to_string()),
            "locks.reaper_interval_ms" => Ok(self.locks.reaper_interval_ms.to_string()),
            "locks.event_capacity" => Ok(self.locks.event_capacity.to_string()),
            "logging.filter" => Ok(self.logging.filter.clone()),
            _ => Err(Error::UnknownConfigKey(key.to_string())),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "locks.tick_interval_ms" => {
                self.locks.tick_interval_ms = parse_positive(key, value)?;
            }
            "locks.reaper_interval_ms" => {
                self.locks.reaper_interval_ms = parse_positive(key, value)?;
            }
            "locks.event_capacity" => {
                self.locks.event_capacity = parse_positive(key, value)? as usize;
            }
            "logging.filter" => {
                if value.trim().is_empty() {
                    return Err(Error::InvalidInput("logging.filter cannot be empty".to_string()));
                }
                self.logging.filter = value.trim().to_string();
            }
            _ => return Err(Error::UnknownConfigKey(key.to_string())),
        }
        Ok(())
    }
}

fn parse_positive(key: &str, value: &str) -> Result<u64> {
    let parsed: u64 = value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("{} must be a whole number, got '{}'", key, value)))?;
    if parsed == 0 {
        return Err(Error::InvalidInput(format!("{} must be greater than zero", key)));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_lock_config() {
        let config = Config::default();
        assert_eq!(config.locks.tick_interval_ms, 10);
        assert_eq!(config.locks.reaper_interval_ms, 10);
        assert_eq!(config.lock_config(), LockConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_get_and_set() {
        let mut config = Config::default();
        config.set("locks.tick_interval_ms", "25").unwrap();
        config.set("logging.filter", "namelock=debug").unwrap();

        assert_eq!(config.get("locks.tick_interval_ms").unwrap(), "25");
        assert_eq!(config.get("logging.filter").unwrap(), "namelock=debug");
        assert_eq!(
            config.lock_config().tick_interval,
            Duration::from_millis(25)
        );
        for key in KEYS {
            assert!(config.get(key).is_ok(), "key {} should be readable", key);
        }
    }

    #[test]
    fn test_set_rejects_bad_values() {
        let mut config = Config::default();
        assert!(matches!(
            config.set("locks.tick_interval_ms", "0"),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            config.set("locks.reaper_interval_ms", "soon"),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            config.set("locks.unknown", "1"),
            Err(Error::UnknownConfigKey(_))
        ));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.set("locks.reaper_interval_ms", "50").unwrap();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[locks]\ntick_interval_ms = 5\n").unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.locks.tick_interval_ms, 5);
        assert_eq!(loaded.locks.reaper_interval_ms, 10);
        assert_eq!(loaded.logging, LoggingConfig::default());
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[locks]\ntick_interval_ms = \"fast\"\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert_eq!(err.code(), "E602");
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_zero_interval_in_file_is_rejected() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[locks]\nreaper_interval_ms = 0\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert_eq!(err.code(), "E311");
    }
}
