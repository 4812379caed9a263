//! Shared fixtures: scripted upstream sources and service builders.

#![allow(dead_code)]

use async_trait::async_trait;
use btc_pulse::config::PriceServiceConfig;
use btc_pulse::models::Quote;
use btc_pulse::services::price::{FetchError, PriceService, PriceSource, RawQuote};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Source that replays a fixed script of outcomes.
///
/// Once only one entry is left it is repeated forever.
pub struct ScriptedSource {
    name: String,
    script: Mutex<VecDeque<Result<RawQuote, FetchError>>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<RawQuote, FetchError>>) -> Arc<Self> {
        Self::named("scripted", script)
    }

    pub fn named(name: &str, script: Vec<Result<RawQuote, FetchError>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_raw(&self) -> Result<RawQuote, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        match script.len() {
            0 => Err(FetchError::Transport("script exhausted".to_string())),
            1 => script.front().cloned().unwrap(),
            _ => script.pop_front().unwrap(),
        }
    }
}

/// Source that never answers.
pub struct HangingSource;

#[async_trait]
impl PriceSource for HangingSource {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn fetch_raw(&self) -> Result<RawQuote, FetchError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(FetchError::Transport("unreachable".to_string()))
    }
}

pub fn raw(price: f64) -> RawQuote {
    RawQuote {
        price,
        change_24h: 0.0,
        volume_24h: 0.0,
    }
}

pub fn raw_full(price: f64, change_24h: f64, volume_24h: f64) -> RawQuote {
    RawQuote {
        price,
        change_24h,
        volume_24h,
    }
}

pub fn rate_limited() -> Result<RawQuote, FetchError> {
    Err(FetchError::UpstreamStatus(429))
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn quote_at(price: f64, secs: i64) -> Quote {
    Quote::new(price, 0.0, 0.0, at(secs))
}

/// Default knobs with the spacing guard disabled so tests can poll back to back.
pub fn unthrottled_config() -> PriceServiceConfig {
    PriceServiceConfig {
        min_fetch_spacing: Duration::ZERO,
        ..PriceServiceConfig::default()
    }
}

pub fn service_with(source: Arc<ScriptedSource>) -> PriceService {
    PriceService::new(unthrottled_config(), vec![source as Arc<dyn PriceSource>]).unwrap()
}

pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);
