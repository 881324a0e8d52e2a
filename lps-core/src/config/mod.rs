//! Configuration loading for the watcher engine.
//!
//! The file schema lives in [`lps_sdk::config`]; this module reads it from
//! disk, validates it and turns it into a [`RuntimeConfig`].

mod runtime;

pub use runtime::{RuntimeConfig, WatcherSchedule};

use lps_sdk::config::{EclipseTargetConfig, FileConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

pub struct ConfigLoader {
    config_path: PathBuf,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
        }
    }

    /// Read, validate and convert the configuration file.
    pub fn load(&self) -> Result<RuntimeConfig, ConfigError> {
        let content = std::fs::read_to_string(&self.config_path)?;
        let config = Self::parse(&content)?;
        tracing::info!(path = ?self.config_path, "Configuration loaded");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<RuntimeConfig, ConfigError> {
        let file_config: FileConfig = toml::from_str(content)?;
        validate(&file_config)?;
        Ok(build_runtime_config(file_config))
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    let w = &config.watchers;
    let intervals = [
        ("pegin_deposit_secs", w.pegin_deposit_secs),
        ("pegin_bridge_secs", w.pegin_bridge_secs),
        ("pegout_rsk_deposit_secs", w.pegout_rsk_deposit_secs),
        ("pegout_btc_transfer_secs", w.pegout_btc_transfer_secs),
        ("pegout_bridge_secs", w.pegout_bridge_secs),
        ("btc_release_secs", w.btc_release_secs),
        ("penalization_secs", w.penalization_secs),
        ("liquidity_check_secs", w.liquidity_check_secs),
        ("cold_wallet_secs", w.cold_wallet_secs),
        ("quote_cleaner_secs", w.quote_cleaner_secs),
        ("eclipse_check_secs", w.eclipse_check_secs),
    ];
    if let Some((name, _)) = intervals.iter().find(|(_, secs)| *secs == 0) {
        return Err(ConfigError::ValidationError(format!(
            "watchers.{name} must be greater than zero"
        )));
    }

    if config.pegout.deposit_cache_page_size == 0 {
        return Err(ConfigError::ValidationError(
            "pegout.deposit_cache_page_size must be greater than zero".to_string(),
        ));
    }
    if config.pegout.btc_release_page_size == 0 {
        return Err(ConfigError::ValidationError(
            "pegout.btc_release_page_size must be greater than zero".to_string(),
        ));
    }
    if config.liquidity.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "liquidity.timeout_secs must be greater than zero".to_string(),
        ));
    }
    if let Some(cold_wallet) = &config.cold_wallet
        && cold_wallet.timeout_secs == 0
    {
        return Err(ConfigError::ValidationError(
            "cold_wallet.timeout_secs must be greater than zero".to_string(),
        ));
    }

    validate_eclipse_target("bitcoin", &config.eclipse.bitcoin)?;
    validate_eclipse_target("rootstock", &config.eclipse.rootstock)
}

fn validate_eclipse_target(chain: &str, target: &EclipseTargetConfig) -> Result<(), ConfigError> {
    if target.tolerance_threshold > 100 {
        return Err(ConfigError::ValidationError(format!(
            "eclipse.{chain}.tolerance_threshold is a percentage, got {}",
            target.tolerance_threshold
        )));
    }
    if !target.enabled {
        return Ok(());
    }
    if target.sources.is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "eclipse.{chain} is enabled but has no sources"
        )));
    }
    if target.retry_interval_secs == 0 {
        return Err(ConfigError::ValidationError(format!(
            "eclipse.{chain}.retry_interval_secs must be greater than zero"
        )));
    }
    Ok(())
}

fn build_runtime_config(file_config: FileConfig) -> RuntimeConfig {
    let cold_wallet_timeout = file_config
        .cold_wallet
        .as_ref()
        .map(|c| Duration::from_secs(c.timeout_secs))
        .unwrap_or(Duration::from_secs(file_config.liquidity.timeout_secs));
    RuntimeConfig {
        schedule: WatcherSchedule::from(&file_config.watchers),
        liquidity_timeout: Duration::from_secs(file_config.liquidity.timeout_secs),
        cold_wallet_timeout,
        bitcoin: file_config.bitcoin,
        rootstock: file_config.rootstock,
        alerts: file_config.alerts,
        pegout: file_config.pegout,
        liquidity: file_config.liquidity,
        cold_wallet: file_config.cold_wallet,
        eclipse: file_config.eclipse,
    }
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}
