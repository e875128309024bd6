//! Configuration file parser for ~/.config/feedbird/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though we log a warning when the file
//! contains potential typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::{FetcherOptions, SyncOptions};
use crate::publish::{PublishOptions, TwitterEndpoints};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Feeds fetched at the same time during `update`.
    pub concurrency: usize,

    /// Timeout for one feed fetch, in seconds.
    pub fetch_timeout_secs: u64,

    /// Retries for feed servers answering 429 or 5xx.
    pub fetch_max_retries: u32,

    /// Items considered per feed per sync.
    pub max_items_per_feed: usize,

    /// Timeout for one publish call, in seconds.
    pub publish_timeout_secs: u64,

    /// Failed publish attempts before an entry is abandoned (0 = unlimited).
    pub max_publish_attempts: u32,

    /// User-Agent header for feed and API requests.
    pub user_agent: String,

    pub twitter_api_base: String,
    pub twitter_upload_base: String,
}

impl Default for Config {
    fn default() -> Self {
        let endpoints = TwitterEndpoints::default();
        Self {
            concurrency: 8,
            fetch_timeout_secs: 30,
            fetch_max_retries: 2,
            max_items_per_feed: 500,
            publish_timeout_secs: 30,
            max_publish_attempts: 10,
            user_agent: concat!("feedbird/", env!("CARGO_PKG_VERSION")).to_string(),
            twitter_api_base: endpoints.api_base,
            twitter_upload_base: endpoints.upload_base,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 9] = [
        "concurrency",
        "fetch_timeout_secs",
        "fetch_max_retries",
        "max_items_per_feed",
        "publish_timeout_secs",
        "max_publish_attempts",
        "user_agent",
        "twitter_api_base",
        "twitter_upload_base",
    ];

    /// Default location: `$HOME/.config/feedbird/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| {
            PathBuf::from(home)
                .join(".config")
                .join("feedbird")
                .join("config.toml")
        })
    }

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to bound memory use
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse as a raw table first to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            concurrency: self.concurrency.max(1),
            // Outlasts the fetcher's own attempts, timeouts and backoff
            fetch_timeout: self
                .fetcher_options()
                .worst_case_duration()
                .saturating_add(Duration::from_secs(1)),
            max_items_per_feed: self.max_items_per_feed.max(1),
        }
    }

    pub fn fetcher_options(&self) -> FetcherOptions {
        FetcherOptions {
            timeout: Duration::from_secs(self.fetch_timeout_secs.max(1)),
            max_retries: self.fetch_max_retries,
            ..FetcherOptions::default()
        }
    }

    pub fn publish_options(&self) -> PublishOptions {
        PublishOptions {
            timeout: Duration::from_secs(self.publish_timeout_secs.max(1)),
            max_attempts: self.max_publish_attempts,
        }
    }

    pub fn twitter_endpoints(&self) -> TwitterEndpoints {
        TwitterEndpoints {
            api_base: self.twitter_api_base.clone(),
            upload_base: self.twitter_upload_base.clone(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
