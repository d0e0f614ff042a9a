//! Configuration loading and management for the MOTD engine.
//!
//! The configuration is stored in TOML format and defines:
//! - Selection settings (channels, reaction weights, favorite emoji, schedule,
//!   operator log channel)
//! - Store settings (database path, attachment directory, publish outbox)
//! - Favorite bookkeeping bounds and admin confirmation expiry

use crate::candidate::{ChannelId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    ValidationError(String),
}

/// Time of day at which the daily cycle runs (UTC).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Hour, 0-23.
    #[serde(default)]
    pub hour: u32,

    /// Minute, 0-59.
    #[serde(default)]
    pub minute: u32,

    /// Second, 0-59.
    #[serde(default)]
    pub second: u32,
}

/// Candidate selection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotdSettings {
    /// Whether events are processed and the schedule runs at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Channel members post candidates into.
    pub candidate_channel: ChannelId,

    /// Channel the winner is republished into.
    pub target_channel: ChannelId,

    /// Our own account; its activity is never treated as community input.
    #[serde(default)]
    pub bot_user_id: Option<UserId>,

    /// Channel warnings and errors are copied to, if any.
    #[serde(default)]
    pub logs_channel: Option<ChannelId>,

    /// The exclusive one-per-voter reaction.
    #[serde(default = "default_favorite_emoji")]
    pub favorite_emoji: String,

    /// Daily trigger time.
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Tracked emoji and their score weights.
    #[serde(default)]
    pub reactions: HashMap<String, i64>,
}

const fn default_enabled() -> bool {
    true
}

fn default_favorite_emoji() -> String {
    "⭐".to_string()
}

/// Candidate store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,

    /// Directory holding candidate attachments.
    #[serde(default = "default_attachment_dir")]
    pub attachment_dir: PathBuf,

    /// Directory the winner's attachments are copied into for publishing.
    /// The gateway owns these files and removes them after uploading.
    #[serde(default = "default_outbox_dir")]
    pub outbox_dir: PathBuf,
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./motd.db")
}

fn default_attachment_dir() -> PathBuf {
    PathBuf::from("./candidates")
}

fn default_outbox_dir() -> PathBuf {
    PathBuf::from("./outbox")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
            attachment_dir: default_attachment_dir(),
            outbox_dir: default_outbox_dir(),
        }
    }
}

/// Bounds on the pending self-removal table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FavoritesConfig {
    /// Seconds a revoked favorite waits for its platform echo.
    #[serde(default = "default_pending_ttl_secs")]
    pub pending_ttl_secs: u64,

    /// Maximum number of echoes awaited at once.
    #[serde(default = "default_pending_cap")]
    pub pending_cap: usize,
}

const fn default_pending_ttl_secs() -> u64 {
    300
}

const fn default_pending_cap() -> usize {
    1024
}

impl Default for FavoritesConfig {
    fn default() -> Self {
        Self {
            pending_ttl_secs: default_pending_ttl_secs(),
            pending_cap: default_pending_cap(),
        }
    }
}

impl FavoritesConfig {
    /// Pending entry lifetime.
    #[must_use]
    pub const fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_ttl_secs)
    }
}

/// Admin command settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdminConfig {
    /// Seconds a destructive-command confirmation token stays valid.
    #[serde(default = "default_confirm_ttl_secs")]
    pub confirm_ttl_secs: u64,
}

const fn default_confirm_ttl_secs() -> u64 {
    30
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            confirm_ttl_secs: default_confirm_ttl_secs(),
        }
    }
}

impl AdminConfig {
    /// Confirmation token lifetime.
    #[must_use]
    pub const fn confirm_ttl(&self) -> Duration {
        Duration::from_secs(self.confirm_ttl_secs)
    }
}

/// Complete MOTD configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotdConfig {
    /// Selection settings.
    pub motd: MotdSettings,

    /// Store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Favorite bookkeeping.
    #[serde(default)]
    pub favorites: FavoritesConfig,

    /// Admin commands.
    #[serde(default)]
    pub admin: AdminConfig,
}

impl MotdConfig {
    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: MotdConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration (pure function).
    pub fn validate(&self) -> Result<(), ConfigError> {
        let schedule = &self.motd.schedule;
        if schedule.hour > 23 || schedule.minute > 59 || schedule.second > 59 {
            return Err(ConfigError::ValidationError(format!(
                "Schedule out of range: {:02}:{:02}:{:02}",
                schedule.hour, schedule.minute, schedule.second
            )));
        }

        let favorite = self.motd.favorite_emoji.trim();
        if favorite.is_empty() {
            return Err(ConfigError::ValidationError(
                "favorite_emoji cannot be empty".to_string(),
            ));
        }
        if self.motd.reactions.contains_key(favorite) {
            return Err(ConfigError::ValidationError(format!(
                "Emoji {favorite} cannot be both weighted and the favorite"
            )));
        }
        if let Some(emoji) = self.motd.reactions.keys().find(|e| e.trim().is_empty()) {
            return Err(ConfigError::ValidationError(format!(
                "Empty weighted emoji: {emoji:?}"
            )));
        }

        // A reset empties the attachment dir, taking an outbox inside it along.
        if self.store.outbox_dir.starts_with(&self.store.attachment_dir) {
            return Err(ConfigError::ValidationError(
                "outbox_dir cannot be inside attachment_dir".to_string(),
            ));
        }

        if self.favorites.pending_cap == 0 {
            return Err(ConfigError::ValidationError(
                "pending_cap must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
