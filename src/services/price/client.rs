//! Fetch client: spacing guard, bounded requests and provider fallback.

use chrono::{DateTime, SubsecRound, Utc};
use futures_util::future::join_all;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration, Instant};
use tracing::{debug, warn};

use super::error::FetchError;
use super::source::PriceSource;
use crate::models::{Quote, SourceStatus};

struct LastFetch {
    started: Instant,
    outcome: Result<Quote, FetchError>,
    last_timestamp: Option<DateTime<Utc>>,
}

enum Attempt {
    Fresh(Result<Quote, FetchError>),
    Throttled(Result<Quote, FetchError>),
}

/// Issues bounded requests against an ordered list of sources.
///
/// Network calls are spaced at least `min_spacing` apart. The internal lock is held
/// for the duration of a fetch, so overlapping callers serialize and the late one
/// observes the spacing guard instead of racing a second request.
pub struct FetchClient {
    sources: Vec<Arc<dyn PriceSource>>,
    min_spacing: Duration,
    request_timeout: Duration,
    last: Mutex<Option<LastFetch>>,
}

impl FetchClient {
    pub fn new(
        sources: Vec<Arc<dyn PriceSource>>,
        min_spacing: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            sources,
            min_spacing,
            request_timeout,
            last: Mutex::new(None),
        }
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    /// Fetch a quote, or return the previous outcome if called inside the spacing window.
    pub async fn fetch(&self) -> Result<Quote, FetchError> {
        match self.attempt().await {
            Attempt::Fresh(outcome) | Attempt::Throttled(outcome) => outcome,
        }
    }

    /// Like [`fetch`](Self::fetch) but reports a throttled call as `None`.
    pub async fn try_fetch(&self) -> Option<Result<Quote, FetchError>> {
        match self.attempt().await {
            Attempt::Fresh(outcome) => Some(outcome),
            Attempt::Throttled(_) => None,
        }
    }

    async fn attempt(&self) -> Attempt {
        let mut last = self.last.lock().await;

        let mut previous_timestamp = None;
        if let Some(prev) = last.as_ref() {
            if prev.started.elapsed() < self.min_spacing {
                debug!(
                    elapsed_ms = prev.started.elapsed().as_millis() as u64,
                    min_spacing_ms = self.min_spacing.as_millis() as u64,
                    "FetchClient: inside spacing window, reusing previous outcome"
                );
                return Attempt::Throttled(prev.outcome.clone());
            }
            previous_timestamp = prev.last_timestamp;
        }

        let started = Instant::now();
        let outcome = self.fetch_from_sources(previous_timestamp).await;
        let last_timestamp = match &outcome {
            Ok(quote) => Some(quote.timestamp),
            Err(_) => previous_timestamp,
        };

        *last = Some(LastFetch {
            started,
            outcome: outcome.clone(),
            last_timestamp,
        });

        Attempt::Fresh(outcome)
    }

    async fn fetch_from_sources(
        &self,
        previous_timestamp: Option<DateTime<Utc>>,
    ) -> Result<Quote, FetchError> {
        let mut last_error = FetchError::Transport("no price sources configured".to_string());

        for source in &self.sources {
            debug!(source = source.name(), "FetchClient: requesting price");
            match self.fetch_one(source.as_ref()).await {
                Ok(quote) => {
                    let quote = match previous_timestamp {
                        // Wall clock stepped backwards; keep history in time order.
                        Some(prev) if quote.timestamp < prev => Quote {
                            timestamp: prev,
                            ..quote
                        },
                        _ => quote,
                    };
                    debug!(
                        source = source.name(),
                        price = quote.price,
                        "FetchClient: fetched price from {}",
                        source.name()
                    );
                    return Ok(quote);
                }
                Err(e) => {
                    warn!(
                        source = source.name(),
                        error = %e,
                        "FetchClient: failed to fetch from {}",
                        source.name()
                    );
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    async fn fetch_one(&self, source: &dyn PriceSource) -> Result<Quote, FetchError> {
        let raw = timeout(self.request_timeout, source.fetch_raw()).await??;
        Ok(Quote::new(
            raw.price,
            raw.change_24h,
            raw.volume_24h,
            Utc::now().trunc_subsecs(3),
        ))
    }

    /// Probe every source concurrently, ignoring the spacing guard.
    pub async fn check_sources(&self) -> Vec<SourceStatus> {
        let probes = self.sources.iter().map(|source| async move {
            let started = Instant::now();
            let result = self.fetch_one(source.as_ref()).await;
            let response_time_ms = started.elapsed().as_millis() as u64;
            match result {
                Ok(quote) => SourceStatus {
                    name: source.name().to_string(),
                    ok: true,
                    price: Some(quote.price),
                    response_time_ms,
                    error: None,
                },
                Err(e) => SourceStatus {
                    name: source.name().to_string(),
                    ok: false,
                    price: None,
                    response_time_ms,
                    error: Some(e.to_string()),
                },
            }
        });

        join_all(probes).await
    }
}
