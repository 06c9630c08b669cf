use crate::read_cache::{DEFAULT_MAX_GROUPS, DEFAULT_MAX_RECORDS};
use crate::sync_engine::DEFAULT_MAX_UNION_FANOUT;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://open.api.nexon.com";

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Upstream API key is empty")]
    EmptyApiKey,

    #[error("Upstream timeout cannot be 0")]
    InvalidTimeout,

    #[error("Cache capacity cannot be 0")]
    InvalidCacheCapacity,

    #[error("Union fan-out cannot be 0")]
    InvalidFanout,

    #[error("Empty sqlite url")]
    EmptyStoreUrl,
}

/// Roster service configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for the public API
    pub listener: Listener,
    /// Listener for `/health` and `/ready`
    pub admin_listener: Listener,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;
        self.upstream.validate()?;
        self.store.validate()?;

        if self.cache.max_records == 0 || self.cache.max_groups == 0 {
            return Err(ValidationError::InvalidCacheCapacity);
        }
        if self.sync.max_union_fanout == 0 {
            return Err(ValidationError::InvalidFanout);
        }
        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Nexon Open API settings.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct UpstreamConfig {
    /// Defaults to the public Nexon Open API host.
    pub base_url: Option<Url>,
    /// May be left empty in the file and supplied through the environment
    /// by the binary.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl UpstreamConfig {
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_ref()
            .map_or(DEFAULT_BASE_URL, |url| url.as_str())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.api_key.trim().is_empty() {
            return Err(ValidationError::EmptyApiKey);
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Clone, Debug, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum StoreConfig {
    #[default]
    Memory,
    Sqlite { url: String },
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            StoreConfig::Sqlite { url } if url.trim().is_empty() => {
                Err(ValidationError::EmptyStoreUrl)
            }
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CacheConfig {
    pub max_records: u64,
    pub max_groups: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            max_records: DEFAULT_MAX_RECORDS,
            max_groups: DEFAULT_MAX_GROUPS,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Minimum spacing between upstream lookups made for ranking seeds.
    pub seed_cooldown_ms: u64,
    pub max_union_fanout: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            seed_cooldown_ms: 200,
            max_union_fanout: DEFAULT_MAX_UNION_FANOUT,
        }
    }
}

impl SyncConfig {
    pub fn seed_cooldown(&self) -> Duration {
        Duration::from_millis(self.seed_cooldown_ms)
    }
}
