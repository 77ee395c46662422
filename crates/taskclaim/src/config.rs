//! # Task claim configuration
//!
//! Loaded from, in order of precedence:
//! 1. Environment variables (`FARMBOT_*`)
//! 2. A TOML file (`--config`, `FARMBOT_CONFIG`, or `farmbot.toml` when present)
//! 3. Built-in defaults
//!
//! ```toml
//! [gateway]
//! address = "/tmp/farm-gateway.sock"
//! ident = "farmbot:tasks"
//!
//! [tasks]
//! startup_delay_ms = 4000
//! push_debounce_ms = 1000
//! claim_interval_ms = 300
//!
//! [items]
//! 20001 = "Carrot Seed"
//! ```

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::summary::{ItemCatalog, EXP_ITEM_ID, GOLD_ITEM_ID};

pub const DEFAULT_CONFIG_FILE: &str = "farmbot.toml";
pub const DEFAULT_SECRET: &str = "change-me-in-production";
#[cfg(unix)]
pub const DEFAULT_GATEWAY: &str = "/tmp/farm-gateway.sock";
#[cfg(not(unix))]
pub const DEFAULT_GATEWAY: &str = "127.0.0.1:17650";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskClaimConfig {
    pub gateway: GatewayConfig,
    pub tasks: TaskSettings,
    /// Item id → display name, keyed by the decimal id.
    pub items: HashMap<String, String>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub address: String,
    pub ident: String,
    pub secret: String,
    pub poll_interval_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_GATEWAY.to_string(),
            ident: format!("farmbot:{}", std::process::id()),
            secret: DEFAULT_SECRET.to_string(),
            poll_interval_ms: 500,
        }
    }
}

impl GatewayConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskSettings {
    pub startup_delay_ms: u64,
    pub push_debounce_ms: u64,
    pub claim_interval_ms: u64,
    pub currency_item_id: u64,
    pub experience_item_id: u64,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            startup_delay_ms: 4_000,
            push_debounce_ms: 1_000,
            claim_interval_ms: 300,
            currency_item_id: GOLD_ITEM_ID,
            experience_item_id: EXP_ITEM_ID,
        }
    }
}

impl TaskSettings {
    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn push_debounce(&self) -> Duration {
        Duration::from_millis(self.push_debounce_ms)
    }

    pub fn claim_interval(&self) -> Duration {
        Duration::from_millis(self.claim_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub dir: PathBuf,
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: PathBuf::from("logs"),
            file: true,
        }
    }
}

impl TaskClaimConfig {
    /// Loads `path` if given, otherwise `FARMBOT_CONFIG` or `farmbot.toml` when it exists,
    /// then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let candidate = std::env::var("FARMBOT_CONFIG")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
                match fs::read_to_string(&candidate) {
                    Ok(raw) => Self::parse(&raw, &candidate)?,
                    Err(err) if err.kind() == ErrorKind::NotFound => Self::default(),
                    Err(source) => {
                        return Err(ConfigError::Read {
                            path: candidate,
                            source,
                        })
                    }
                }
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw, path)
    }

    fn parse(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.item_catalog()?;
        Ok(config)
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(address) = lookup("FARMBOT_GATEWAY") {
            self.gateway.address = address;
        }
        if let Some(secret) = lookup("FARMBOT_SECRET") {
            self.gateway.secret = secret;
        }
        if let Some(ident) = lookup("FARMBOT_IDENT") {
            self.gateway.ident = ident;
        }
        if let Some(dir) = lookup("FARMBOT_LOG_DIR") {
            self.logging.dir = PathBuf::from(dir);
        }
    }

    pub fn item_catalog(&self) -> Result<ItemCatalog, ConfigError> {
        let mut names = HashMap::with_capacity(self.items.len());
        for (key, name) in &self.items {
            let id = key
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue {
                    key: "items",
                    value: key.clone(),
                })?;
            names.insert(id, name.clone());
        }
        Ok(ItemCatalog::new(names))
    }
}
