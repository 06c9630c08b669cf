use roster::config::Config as RosterConfig;
use serde::Deserialize;
use std::fs::File;

pub const API_KEY_ENV: &str = "NEXON_API_KEY";

#[derive(Deserialize, Debug, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
    #[serde(default = "default_metrics_prefix")]
    pub prefix: String,
}

fn default_metrics_prefix() -> String {
    "maplesync".into()
}

#[derive(Deserialize, Debug, PartialEq)]
pub struct LoggingConfig {
    pub sentry_dsn: Option<String>,
    /// `EnvFilter` directives; `RUST_LOG` wins when set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "info".into()
}

#[derive(Deserialize, Debug, Default)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    pub roster: RosterConfig,
}

impl Config {
    /// Loads YAML from `path`. A non-empty `NEXON_API_KEY` replaces the
    /// file's upstream API key.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let mut config: Config = serde_yaml::from_reader(file)?;
        config.override_api_key(std::env::var(API_KEY_ENV).ok());
        config.roster.validate()?;

        Ok(config)
    }

    fn override_api_key(&mut self, api_key: Option<String>) {
        if let Some(api_key) = api_key.filter(|key| !key.trim().is_empty()) {
            self.roster.upstream.api_key = api_key;
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid roster config: {0}")]
    ValidationError(#[from] roster::config::ValidationError),
}
