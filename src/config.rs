use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "logscale-query.toml";
pub const ENV_PREFIX: &str = "LOGSCALE_QUERY";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub backend: BackendConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    pub base_url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryConfig {
    #[serde(default)]
    pub default_repository: Option<String>,
    /// Falls back to the local UTC offset when unset
    #[serde(default)]
    pub time_zone_offset_minutes: Option<i32>,
    #[serde(default = "default_poll_after_ms")]
    pub default_poll_after_ms: u64,
    #[serde(default = "default_max_not_found_attempts")]
    pub max_not_found_attempts: u32,
    #[serde(default = "default_query_marker")]
    pub query_marker: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_poll_after_ms() -> u64 {
    1000
}

fn default_max_not_found_attempts() -> u32 {
    3
}

fn default_query_marker() -> String {
    "/** logscale-query initiated search */".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_repository: None,
            time_zone_offset_minutes: None,
            default_poll_after_ms: default_poll_after_ms(),
            max_not_found_attempts: default_max_not_found_attempts(),
            query_marker: default_query_marker(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl QueryConfig {
    pub fn resolved_time_zone_offset_minutes(&self) -> i32 {
        self.time_zone_offset_minutes
            .unwrap_or_else(|| chrono::Local::now().offset().local_minus_utc() / 60)
    }
}

/// Load configuration from a TOML file layered with `LOGSCALE_QUERY__*` environment variables
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.backend.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("backend.base_url cannot be empty".to_string()));
    }

    match reqwest::Url::parse(&cfg.backend.base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => {
            return Err(ConfigError::Invalid(format!(
                "backend.base_url has unsupported scheme '{}'",
                url.scheme()
            )))
        }
        Err(e) => {
            return Err(ConfigError::Invalid(format!(
                "backend.base_url '{}' is not a valid URL: {}",
                cfg.backend.base_url, e
            )))
        }
    }

    if cfg.backend.timeout_seconds == 0 {
        return Err(ConfigError::Invalid(
            "backend.timeout_seconds must be greater than 0".to_string(),
        ));
    }

    if cfg.query.max_not_found_attempts == 0 {
        return Err(ConfigError::Invalid(
            "query.max_not_found_attempts must be at least 1".to_string(),
        ));
    }

    if let Some(offset) = cfg.query.time_zone_offset_minutes {
        if !(-14 * 60..=14 * 60).contains(&offset) {
            return Err(ConfigError::Invalid(format!(
                "query.time_zone_offset_minutes {} is out of range",
                offset
            )));
        }
    }

    Ok(())
}
