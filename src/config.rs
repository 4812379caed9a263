//! Environment-driven configuration.
//!
//! All knobs are read from environment variables (a `.env` file is loaded by the
//! binaries). Lookups go through a closure so tests can supply a plain map.

use std::env;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::services::price::SourceFormat;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_MIN_FETCH_SPACING_MS: u64 = 2_000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_CEILING_MS: u64 = 30_000;
pub const DEFAULT_HISTORY_RETENTION_MS: u64 = 24 * 60 * 60 * 1000;
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be greater than zero")]
    NotPositive { key: &'static str },

    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("invalid URL for {key}: {reason}")]
    InvalidUrl { key: &'static str, reason: String },

    #[error("{0}")]
    UnknownSource(String),

    #[error("{0} is required")]
    Missing(&'static str),
}

pub fn get_environment() -> String {
    env::var("ENVIRONMENT").unwrap_or_else(|_| "sandbox".to_string())
}

pub fn get_port() -> u16 {
    env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080)
}

/// Tuning knobs of the price poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceServiceConfig {
    /// Regular cadence; also the base delay of the first backoff retry.
    pub poll_interval: Duration,
    pub min_fetch_spacing: Duration,
    pub max_retries: u32,
    pub backoff_ceiling: Duration,
    pub history_retention: Duration,
    pub fetch_timeout: Duration,
}

impl Default for PriceServiceConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            min_fetch_spacing: Duration::from_millis(DEFAULT_MIN_FETCH_SPACING_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_ceiling: Duration::from_millis(DEFAULT_BACKOFF_CEILING_MS),
            history_retention: Duration::from_millis(DEFAULT_HISTORY_RETENTION_MS),
            fetch_timeout: Duration::from_millis(DEFAULT_FETCH_TIMEOUT_MS),
        }
    }
}

impl PriceServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            poll_interval: millis(&lookup, "POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?,
            min_fetch_spacing: millis(
                &lookup,
                "MIN_FETCH_SPACING_MS",
                DEFAULT_MIN_FETCH_SPACING_MS,
            )?,
            max_retries: parse_or(&lookup, "MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            backoff_ceiling: millis(&lookup, "BACKOFF_CEILING_MS", DEFAULT_BACKOFF_CEILING_MS)?,
            history_retention: millis(
                &lookup,
                "HISTORY_RETENTION_MS",
                DEFAULT_HISTORY_RETENTION_MS,
            )?,
            fetch_timeout: millis(&lookup, "FETCH_TIMEOUT_MS", DEFAULT_FETCH_TIMEOUT_MS)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::NotPositive {
                key: "POLL_INTERVAL_MS",
            });
        }
        if self.backoff_ceiling.is_zero() {
            return Err(ConfigError::NotPositive {
                key: "BACKOFF_CEILING_MS",
            });
        }
        if self.history_retention.is_zero() {
            return Err(ConfigError::NotPositive {
                key: "HISTORY_RETENTION_MS",
            });
        }
        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::NotPositive {
                key: "FETCH_TIMEOUT_MS",
            });
        }
        Ok(())
    }
}

/// An upstream the fetch client should query, in fallback order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub format: SourceFormat,
    pub url: Url,
}

pub fn get_price_sources() -> Result<Vec<SourceSpec>, ConfigError> {
    price_sources_from_lookup(|key| env::var(key).ok())
}

/// `PRICE_SOURCES` is a comma-separated provider list (default `generic`).
/// The `generic` provider requires `PRICE_SOURCE_URL`; named providers use their
/// public endpoint.
pub fn price_sources_from_lookup<F>(lookup: F) -> Result<Vec<SourceSpec>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let names = lookup("PRICE_SOURCES").unwrap_or_else(|| "generic".to_string());
    let mut specs = Vec::new();

    for name in names.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let format: SourceFormat = name.parse().map_err(ConfigError::UnknownSource)?;
        let url = match format.default_url() {
            Some(default) => parse_url("PRICE_SOURCES", default)?,
            None => {
                let raw = lookup("PRICE_SOURCE_URL").ok_or(ConfigError::Missing("PRICE_SOURCE_URL"))?;
                parse_url("PRICE_SOURCE_URL", &raw)?
            }
        };
        specs.push(SourceSpec { format, url });
    }

    if specs.is_empty() {
        return Err(ConfigError::Missing("PRICE_SOURCES"));
    }
    Ok(specs)
}

pub fn get_sink_url() -> Result<Option<Url>, ConfigError> {
    match env::var("PRICE_SINK_URL") {
        Ok(raw) if !raw.trim().is_empty() => parse_url("PRICE_SINK_URL", &raw).map(Some),
        _ => Ok(None),
    }
}

fn parse_url(key: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidUrl {
        key,
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidUrl {
            key,
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key,
            value: raw.clone(),
        }),
        None => Ok(default),
    }
}

fn millis<F>(lookup: &F, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, key, default).map(Duration::from_millis)
}
