use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::models::{BotsHttpSettings, StorageKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind_address: String,
    /// Shared-secret bearer token for the HTTP command source. `None`
    /// leaves that source without a configured token.
    pub auth_token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:8080".to_string(),
            auth_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub enabled: bool,
    /// Bot API token for the long-poll session.
    pub bot_token: Option<String>,
    /// Chat id whose messages are authorized to issue commands. The chat
    /// identity acts as the token for this source; `None` leaves the source
    /// without a configured token.
    pub allowed_chat_id: Option<String>,
    pub api_base: String,
    pub poll_timeout_seconds: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: None,
            allowed_chat_id: None,
            api_base: "https://api.telegram.org".to_string(),
            poll_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default backend for bots that do not declare a preference.
    pub state_storage: StorageKind,
    /// SQLite database path for the durable backend.
    pub database_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_storage: StorageKind::InMemory,
            database_url: "sqlite://botkeeper.db?mode=rwc".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    /// Maximum concurrent command executions before callers are shed.
    pub rate_limit_capacity: usize,
    pub rate_limit_timeout_ms: u64,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            rate_limit_capacity: 5,
            rate_limit_timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub telegram: TelegramConfig,
    pub engine: EngineConfig,
    pub commands: CommandsConfig,
    pub http: BotsHttpSettings,
}

impl AppConfig {
    /// Layered load: built-in defaults, then an optional TOML file, then
    /// `BOTKEEPER_`-prefixed environment variables.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder()
            .set_default("api.enabled", true)?
            .set_default("api.bind_address", "0.0.0.0:8080")?
            .set_default("telegram.enabled", false)?
            .set_default("telegram.api_base", "https://api.telegram.org")?
            .set_default("telegram.poll_timeout_seconds", 30)?
            .set_default("engine.state_storage", "in_memory")?
            .set_default("engine.database_url", "sqlite://botkeeper.db?mode=rwc")?
            .set_default("commands.rate_limit_capacity", 5)?
            .set_default("commands.rate_limit_timeout_ms", 1000)?;

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("BOTKEEPER")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("failed to assemble configuration sources")?
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.enabled && self.api.bind_address.parse::<std::net::SocketAddr>().is_err() {
            anyhow::bail!("invalid api.bind_address: {}", self.api.bind_address);
        }
        if self.telegram.enabled && self.telegram.bot_token.is_none() {
            anyhow::bail!("telegram source enabled without telegram.bot_token");
        }
        if self.commands.rate_limit_capacity == 0 {
            anyhow::bail!("commands.rate_limit_capacity must be at least 1");
        }
        Ok(())
    }
}
