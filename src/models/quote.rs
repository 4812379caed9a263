use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single normalized price observation.
///
/// Only built from a successful fetch with a positive, finite price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub price: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "change24h")]
    pub change_24h: f64,
    #[serde(rename = "volume24h")]
    pub volume_24h: f64,
}

impl Quote {
    pub fn new(price: f64, change_24h: f64, volume_24h: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            price,
            timestamp,
            change_24h,
            volume_24h,
        }
    }
}

/// Direction of the last price move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceTrend {
    Up,
    Down,
    #[default]
    Neutral,
}

impl PriceTrend {
    pub fn between(previous: Option<&Quote>, current: &Quote) -> Self {
        match previous {
            Some(prev) if current.price > prev.price => PriceTrend::Up,
            Some(prev) if current.price < prev.price => PriceTrend::Down,
            _ => PriceTrend::Neutral,
        }
    }
}

/// Outcome of probing a single upstream source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceStatus {
    pub name: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Point-in-time view of the price service for health and UI purposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub connected: bool,
    pub running: bool,
    pub retry_count: u32,
    pub subscribers: usize,
    pub history_len: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
    pub trend: PriceTrend,
}
