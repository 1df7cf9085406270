use std::path::{Path, PathBuf};
use std::time::Duration;

use nostr_sdk::Kind;
use serde::{Deserialize, Serialize};

use crate::constants::{self, kinds};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid keyword {keyword:?}: {source}")]
    Keyword {
        keyword: String,
        source: regex::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Keywords that select a reply, checked in this order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommandKeywords {
    pub stats: String,
    pub total: String,
    pub top: String,
    pub missed: String,
}

impl Default for CommandKeywords {
    fn default() -> Self {
        Self {
            stats: "stats".to_string(),
            total: "total".to_string(),
            top: "top".to_string(),
            missed: "missed".to_string(),
        }
    }
}

/// Bot configuration loaded from a JSON file.
///
/// Every field has a default, so `{}` is a valid file. The private key is not
/// part of this struct; it comes from the environment (see [`crate::keys`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BotConfig {
    /// Outbound relay set, used for listening, dedup checks and publishing
    pub relays: Vec<String>,
    pub monitored_kind: u16,
    pub admission_keyword: String,
    pub command_keywords: CommandKeywords,
    /// Public URL of this relay, quoted in the "no history" reply
    pub relay_url: String,
    /// Where users can browse stored notes
    pub view_url: String,
    /// nostrdb directory shared with the relay process
    pub data_dir: PathBuf,
    pub query_timeout_secs: u64,
    pub dedup_timeout_secs: u64,
    pub publish_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Requests handled concurrently by the dispatcher
    pub workers: usize,
    pub lookback_secs: u64,
    pub resubscribe_delay_secs: u64,
    pub answered_cache_size: usize,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            relays: constants::DEFAULT_RELAYS
                .iter()
                .map(|r| r.to_string())
                .collect(),
            monitored_kind: kinds::TEXT_NOTE,
            admission_keyword: constants::ADMISSION_KEYWORD.to_string(),
            command_keywords: CommandKeywords::default(),
            relay_url: constants::RELAY_URL.to_string(),
            view_url: constants::VIEW_URL.to_string(),
            data_dir: Self::default_data_dir(),
            query_timeout_secs: constants::QUERY_TIMEOUT_SECS,
            dedup_timeout_secs: constants::DEDUP_TIMEOUT_SECS,
            publish_timeout_secs: constants::PUBLISH_TIMEOUT_SECS,
            connect_timeout_secs: constants::CONNECT_TIMEOUT_SECS,
            workers: constants::WORKERS,
            lookback_secs: constants::LOOKBACK_SECS,
            resubscribe_delay_secs: constants::RESUBSCRIBE_DELAY_SECS,
            answered_cache_size: constants::ANSWERED_CACHE_SIZE,
        }
    }
}

impl BotConfig {
    pub fn default_data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".gm-relay")
            .join("db")
    }

    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: BotConfig =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relays.is_empty() {
            return Err(ConfigError::Invalid("relay list is empty".to_string()));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".to_string()));
        }
        let keywords = [
            &self.admission_keyword,
            &self.command_keywords.stats,
            &self.command_keywords.total,
            &self.command_keywords.top,
            &self.command_keywords.missed,
        ];
        if keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(ConfigError::Invalid("keywords must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn kind(&self) -> Kind {
        Kind::from(self.monitored_kind)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn dedup_timeout(&self) -> Duration {
        Duration::from_secs(self.dedup_timeout_secs)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn lookback(&self) -> Duration {
        Duration::from_secs(self.lookback_secs)
    }

    pub fn resubscribe_delay(&self) -> Duration {
        Duration::from_secs(self.resubscribe_delay_secs)
    }
}
