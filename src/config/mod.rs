//! # Configuration Management Module
//!
//! Centralized, TOML-backed configuration for the economy service with serde defaults for every
//! section, so a partial file is always valid.
//!
//! ## Configuration Structure
//!
//! - [`StorageConfig`] - ledger location on disk
//! - [`LoggingConfig`] - log level and optional log file
//! - [`AuthConfig`] - shared secret for bot callers
//! - [`ChannelConfig`] - initial live/offline state of the broadcast channel
//! - [`EconomyConfig`] - every tunable of the transaction engine (tables, cooldowns, costs)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lootline::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("lootline.toml").await?;
//!     config.validate()?;
//!     println!("Ledger: {}", config.storage.ledger_path());
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [storage]
//! data_dir = "./data"
//!
//! [auth]
//! bot_secret = "change-me"
//!
//! [economy.play]
//! cooldown_secs = 300
//! win_weight = 0.55
//! bust_weight = 0.45
//! ```

mod economy;

pub use economy::{
    BailConfig, CatalogEntry, CrateConfig, CrateTier, EconomyConfig, FactionConfig, Goods,
    LootItem, MissionConfig, PlayConfig, PlayerConfig, RobConfig, ShopConfig, StatusConfig,
    TerritorySeed, TokenConfig,
};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    /// Optional override for the sled ledger path; defaults to `<data_dir>/ledger`.
    #[serde(default)]
    pub ledger_path: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            ledger_path: None,
        }
    }
}

impl StorageConfig {
    pub fn ledger_path(&self) -> String {
        self.ledger_path
            .clone()
            .unwrap_or_else(|| format!("{}/ledger", self.data_dir.trim_end_matches('/')))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some("lootline.log".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// Shared secret presented by the chat bot. Bot calls are refused when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelConfig {
    /// Live state assumed at startup until the stream watcher reports otherwise.
    #[serde(default)]
    pub assume_live: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub economy: EconomyConfig,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        Self::from_toml(&content).map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage.data_dir.trim().is_empty() {
            return Err(anyhow!("storage.data_dir must not be empty"));
        }
        if let Some(secret) = &self.auth.bot_secret {
            if secret.len() < 8 {
                return Err(anyhow!("auth.bot_secret must be at least 8 characters"));
            }
        }
        self.economy.validate()
    }
}
