//! # Configuration Module
//!
//! TOML configuration for the bot, loaded once at startup.
//!
//! ## Sections
//!
//! - [`BotConfig`] - command prefix, help text, admin node, reply size cap
//! - [`BbsSettings`] - DM requirement and per-channel scoping of the board
//! - [`StorageConfig`] - whether to persist anything, and where
//! - [`TransportConfig`] - how to reach the radio bridge
//! - [`LoggingConfig`] - level and log files
//!
//! ## File Format
//!
//! ```toml
//! [bot]
//! prefix = "."
//! help_text = "http://w2asm.com/hops"
//! admin_id = "!0a1b2c3d"
//! reply_cap = 200
//!
//! [bbs]
//! require_dm = true
//! per_channel = false
//!
//! [storage]
//! enabled = true
//! db_path = "./hops.db"
//!
//! [transport]
//! mode = "stdio"
//! min_send_gap_ms = 1000
//! node_cache_path = "./nodes.json"
//!
//! [logging]
//! level = "info"
//! file = "hops.log"
//! security_file = "hops-security.log"
//! ```
//!
//! Every section and field has a default, so an empty file is a valid config.
//! `HOPS_ADMIN_ID` in the environment takes precedence over `bot.admin_id`.

use anyhow::{anyhow, Result};
use log::{error, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::bot::batch::DEFAULT_REPLY_CAP;
use crate::bot::router::{RouterSettings, DEFAULT_HELP_TEXT, DEFAULT_PREFIX};
use crate::mesh::transport::WriterTuning;
use crate::mesh::NodeId;

/// Environment variable overriding `bot.admin_id`.
pub const ADMIN_ENV: &str = "HOPS_ADMIN_ID";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub bbs: BbsSettings,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Single character every command starts with
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_help_text")]
    pub help_text: String,
    /// Node allowed to run `status` and `shutdown`, as `!xxxxxxxx`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_id: Option<String>,
    #[serde(default = "default_reply_cap")]
    pub reply_cap: usize,
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

fn default_help_text() -> String {
    DEFAULT_HELP_TEXT.to_string()
}

fn default_reply_cap() -> usize {
    DEFAULT_REPLY_CAP
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            help_text: default_help_text(),
            admin_id: None,
            reply_cap: default_reply_cap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BbsSettings {
    #[serde(default = "default_true")]
    pub require_dm: bool,
    #[serde(default)]
    pub per_channel: bool,
}

fn default_true() -> bool {
    true
}

impl Default for BbsSettings {
    fn default() -> Self {
        Self {
            require_dm: true,
            per_channel: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Without storage the board and mailbox commands are inert
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "./hops.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    #[default]
    Stdio,
    Tcp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub mode: TransportMode,
    /// `host:port` of the bridge when `mode = "tcp"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default = "default_min_send_gap_ms")]
    pub min_send_gap_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_cache_path: Option<String>,
}

fn default_min_send_gap_ms() -> u64 {
    WriterTuning::default().min_send_gap_ms
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::Stdio,
            address: None,
            min_send_gap_ms: default_min_send_gap_ms(),
            node_cache_path: Some("./nodes.json".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub security_file: Option<String>,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: Some("hops.log".to_string()),
            security_file: Some("hops-security.log".to_string()),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

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

    /// The admin node, with `HOPS_ADMIN_ID` taking precedence over the file.
    ///
    /// A malformed id is logged and treated as no admin at all.
    pub fn admin_node(&self) -> Option<NodeId> {
        self.admin_node_with(std::env::var(ADMIN_ENV).ok())
    }

    pub fn admin_node_with(&self, env_value: Option<String>) -> Option<NodeId> {
        let raw = env_value
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.bot.admin_id.clone())?;
        match raw.parse::<NodeId>() {
            Ok(id) => Some(id),
            Err(e) => {
                error!("Invalid admin id, admin commands disabled: {}", e);
                None
            }
        }
    }

    /// Command prefix as a character; falls back to `.` when the configured
    /// value is not exactly one character.
    pub fn prefix_char(&self) -> char {
        let mut chars = self.bot.prefix.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if !c.is_whitespace() => c,
            _ => {
                warn!(
                    "Invalid command prefix {:?}, using '{}'",
                    self.bot.prefix, DEFAULT_PREFIX
                );
                DEFAULT_PREFIX
            }
        }
    }

    pub fn router_settings(&self) -> RouterSettings {
        RouterSettings {
            prefix: self.prefix_char(),
            help_text: self.bot.help_text.clone(),
            bbs_require_dm: self.bbs.require_dm,
            bbs_per_channel: self.bbs.per_channel,
            reply_cap: self.bot.reply_cap.max(1),
        }
    }

    pub fn writer_tuning(&self) -> WriterTuning {
        WriterTuning {
            min_send_gap_ms: self.transport.min_send_gap_ms,
        }
    }
}
