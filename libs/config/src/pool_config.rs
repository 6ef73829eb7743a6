//! Pool Configuration Module
//!
//! Provides configuration loading and validation for Tidal pools.
//! Supports loading from TOML files with environment-specific overrides.

use crate::defaults::{files, logging, pool};
use anyhow::{bail, Context, Result};
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct TidalConfig {
    /// Pool parameters, fixed for the pool's lifetime
    pub pool: PoolSettings,

    /// Logging setup
    pub logging: LoggingSettings,
}

/// Parameters consumed once when a pool is constructed
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct PoolSettings {
    /// Steps per settlement interval; long-term orders expire on multiples of it
    pub interval_length: u64,

    /// Instant swap fee as `fee_numerator / fee_denominator`
    pub fee_numerator: u32,
    pub fee_denominator: u32,

    /// Interval boundaries processed by a single virtualization pass
    pub max_intervals_per_call: u64,

    /// Upper bound on `num_intervals` for a new long-term order
    pub max_order_intervals: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
    /// Extra `EnvFilter` directives such as `tidal_amm=trace`
    pub directives: Option<String>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            interval_length: pool::INTERVAL_LENGTH,
            fee_numerator: pool::FEE_NUMERATOR,
            fee_denominator: pool::FEE_DENOMINATOR,
            max_intervals_per_call: pool::MAX_INTERVALS_PER_CALL,
            max_order_intervals: pool::MAX_ORDER_INTERVALS,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: logging::LEVEL.to_string(),
            json: false,
            directives: None,
        }
    }
}

impl PoolSettings {
    /// Reject settings a pool cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.interval_length == 0 {
            bail!("interval_length must be at least one step");
        }
        if self.fee_denominator == 0 {
            bail!("fee_denominator must be positive");
        }
        if self.fee_numerator >= self.fee_denominator {
            bail!(
                "fee {}/{} must be below 100%",
                self.fee_numerator,
                self.fee_denominator
            );
        }
        if self.max_intervals_per_call == 0 {
            bail!("max_intervals_per_call must be positive");
        }
        if self.max_order_intervals == 0 {
            bail!("max_order_intervals must be positive");
        }
        Ok(())
    }
}

impl LoggingSettings {
    pub fn validate(&self) -> Result<()> {
        let level = self.level.to_lowercase();
        if !logging::LEVELS.contains(&level.as_str()) {
            bail!(
                "unknown log level '{}', expected one of {:?}",
                self.level,
                logging::LEVELS
            );
        }
        Ok(())
    }
}

impl TidalConfig {
    /// Load configuration from files with environment overrides
    ///
    /// Sources, lowest priority first: built-in defaults, the base file,
    /// `config/environments/<environment>.toml`, then `TIDAL_` variables
    /// with `__` between nested keys (`TIDAL_POOL__INTERVAL_LENGTH=20`).
    pub fn load(base_path: Option<&Path>, environment: Option<&str>) -> Result<Self> {
        let defaults =
            Config::try_from(&TidalConfig::default()).context("Failed to encode defaults")?;

        let mut builder = Config::builder().add_source(defaults);

        // An explicit path must exist; the conventional one is optional
        builder = match base_path {
            Some(path) => {
                debug!("Loading base config: {:?}", path);
                builder.add_source(File::from(path).required(true))
            }
            None => builder.add_source(File::from(Path::new(files::BASE_CONFIG_PATH)).required(false)),
        };

        if let Some(env) = environment {
            let env_file = PathBuf::from(files::ENVIRONMENTS_DIR).join(format!("{}.toml", env));

            if env_file.exists() {
                info!("Loading environment config: {:?}", env_file);
                builder = builder.add_source(File::from(env_file));
            } else {
                warn!("Environment config not found: {:?}", env_file);
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(files::ENV_PREFIX)
                .prefix_separator("_")
                .separator(files::ENV_SEPARATOR)
                .try_parsing(true),
        );

        let config: TidalConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.pool.validate().context("Invalid [pool] section")?;
        self.logging.validate().context("Invalid [logging] section")?;
        Ok(())
    }

    /// Render as TOML, the format `load` reads back
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

/// Convenience function to load configuration with defaults
pub fn load_config(environment: Option<&str>) -> Result<TidalConfig> {
    TidalConfig::load(None, environment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_base_config() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("pool.toml");

        let config_content = r#"
[pool]
interval_length = 25
fee_numerator = 5
fee_denominator = 10000

[logging]
level = "debug"
json = true
"#;

        fs::write(&config_path, config_content).unwrap();

        let config = TidalConfig::load(Some(&config_path), None).unwrap();

        assert_eq!(config.pool.interval_length, 25);
        assert_eq!(config.pool.fee_numerator, 5);
        assert_eq!(config.pool.fee_denominator, 10_000);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("pool.toml");
        fs::write(&config_path, "[pool]\ninterval_length = 7\n").unwrap();

        let config = TidalConfig::load(Some(&config_path), None).unwrap();

        assert_eq!(config.pool.interval_length, 7);
        assert_eq!(config.pool.fee_numerator, pool::FEE_NUMERATOR);
        assert_eq!(config.pool.fee_denominator, pool::FEE_DENOMINATOR);
        assert_eq!(config.logging, LoggingSettings::default());
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(TidalConfig::load(Some(&missing), None).is_err());
    }

    #[test]
    fn test_invalid_fee_rejected() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("pool.toml");
        fs::write(
            &config_path,
            "[pool]\nfee_numerator = 1000\nfee_denominator = 1000\n",
        )
        .unwrap();

        let err = TidalConfig::load(Some(&config_path), None).unwrap_err();
        assert!(format!("{:#}", err).contains("below 100%"));
    }

    #[test]
    fn test_environment_override() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("pool.toml");
        fs::write(&config_path, "[pool]\nmax_order_intervals = 50\n").unwrap();

        std::env::set_var("TIDAL_POOL__MAX_ORDER_INTERVALS", "75");
        let config = TidalConfig::load(Some(&config_path), None);
        std::env::remove_var("TIDAL_POOL__MAX_ORDER_INTERVALS");

        assert_eq!(config.unwrap().pool.max_order_intervals, 75);
    }

    #[test]
    fn test_toml_round_trip_through_loader() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("pool.toml");

        let mut config = TidalConfig::default();
        config.pool.interval_length = 64;
        config.logging.directives = Some("tidal_amm=trace".to_string());
        fs::write(&config_path, config.to_toml().unwrap()).unwrap();

        let loaded = TidalConfig::load(Some(&config_path), None).unwrap();
        assert_eq!(loaded.pool.interval_length, 64);
        assert_eq!(loaded.logging.directives.as_deref(), Some("tidal_amm=trace"));
    }

    #[test]
    fn test_validation_rules() {
        assert!(PoolSettings::default().validate().is_ok());

        let zero_interval = PoolSettings {
            interval_length: 0,
            ..PoolSettings::default()
        };
        assert!(zero_interval.validate().is_err());

        let zero_guard = PoolSettings {
            max_intervals_per_call: 0,
            ..PoolSettings::default()
        };
        assert!(zero_guard.validate().is_err());

        let loud = LoggingSettings {
            level: "LOUD".to_string(),
            ..LoggingSettings::default()
        };
        assert!(loud.validate().is_err());
        let upper = LoggingSettings {
            level: "WARN".to_string(),
            ..LoggingSettings::default()
        };
        assert!(upper.validate().is_ok());
    }
}
