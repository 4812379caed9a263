//! Price state machine: the single writer of quote state and history.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::backoff::BackoffController;
use super::client::FetchClient;
use super::error::FetchError;
use super::history::HistoryBuffer;
use super::sink::PriceSink;
use super::subscribers::{PriceSubscriber, SubscriberRegistry, SubscriptionHandle};
use crate::config::PriceServiceConfig;
use crate::metrics::Metrics;
use crate::models::{PriceTrend, Quote, ServiceStatus};

/// Snapshot of the poller-owned state.
#[derive(Debug, Clone, Default)]
pub struct ServiceState {
    pub current_quote: Option<Quote>,
    pub connected: bool,
    pub retry_count: u32,
    pub trend: PriceTrend,
    // Bumped once per accepted quote; orders deliveries per subscriber.
    sequence: u64,
}

/// Result of one poll step.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// A fresh quote was committed and broadcast.
    Updated(Quote),
    /// The fetch failed; `retry_in` is the backoff delay if an extra retry is due.
    Failed {
        error: FetchError,
        retry_in: Option<Duration>,
    },
    /// The call landed inside the fetch spacing window; nothing changed.
    Throttled,
    /// The tracker was stopped; any late result was dropped.
    Discarded,
}

pub struct PriceTracker {
    client: FetchClient,
    backoff: Mutex<BackoffController>,
    state: RwLock<ServiceState>,
    history: RwLock<HistoryBuffer>,
    registry: Arc<SubscriberRegistry>,
    sink: Option<Arc<dyn PriceSink>>,
    metrics: Option<Arc<Metrics>>,
    stopped: AtomicBool,
}

impl PriceTracker {
    pub fn new(
        config: &PriceServiceConfig,
        client: FetchClient,
        sink: Option<Arc<dyn PriceSink>>,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self {
            client,
            backoff: Mutex::new(BackoffController::new(
                config.poll_interval,
                config.backoff_ceiling,
                config.max_retries,
            )),
            state: RwLock::new(ServiceState::default()),
            history: RwLock::new(HistoryBuffer::new(config.history_retention)),
            registry: Arc::new(SubscriberRegistry::new()),
            sink,
            metrics,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn client(&self) -> &FetchClient {
        &self.client
    }

    /// Run one fetch attempt and commit its outcome.
    pub async fn poll_once(&self) -> PollOutcome {
        if self.is_stopped() {
            return PollOutcome::Discarded;
        }

        let Some(outcome) = self.client.try_fetch().await else {
            return PollOutcome::Throttled;
        };

        match outcome {
            Ok(quote) => self.apply_success(quote),
            Err(error) => self.apply_failure(error),
        }
    }

    fn apply_success(&self, quote: Quote) -> PollOutcome {
        let (sequence, history_len) = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if self.is_stopped() {
                return PollOutcome::Discarded;
            }
            self.backoff
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .record_success();
            state.trend = PriceTrend::between(state.current_quote.as_ref(), &quote);
            state.current_quote = Some(quote.clone());
            state.connected = true;
            state.retry_count = 0;
            state.sequence += 1;

            let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
            history.append(quote.clone());
            (state.sequence, history.len())
        };

        let report = self.registry.broadcast(sequence, &quote);

        debug!(
            price = quote.price,
            change_24h = quote.change_24h,
            volume_24h = quote.volume_24h,
            delivered = report.delivered,
            failed = report.failed,
            history_len,
            "PriceTracker: price updated"
        );

        if let Some(metrics) = &self.metrics {
            metrics
                .fetch_attempts_total
                .with_label_values(&["success"])
                .inc();
            metrics.upstream_connected.set(1.0);
            metrics.retry_count.set(0);
            metrics.history_entries.set(history_len as i64);
            metrics
                .subscriber_failures_total
                .inc_by(report.failed as u64);
        }

        self.persist(&quote);
        PollOutcome::Updated(quote)
    }

    fn apply_failure(&self, error: FetchError) -> PollOutcome {
        let (retry_in, retry_count, max_retries) = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if self.is_stopped() {
                return PollOutcome::Discarded;
            }
            let mut backoff = self.backoff.lock().unwrap_or_else(PoisonError::into_inner);
            let retry_in = backoff.record_failure();
            state.connected = false;
            state.retry_count = backoff.retry_count();
            (retry_in, backoff.retry_count(), backoff.max_retries())
        };

        match retry_in {
            Some(delay) => warn!(
                error = %error,
                retry_count,
                max_retries,
                retry_in_ms = delay.as_millis() as u64,
                "PriceTracker: fetch failed, retrying in {}s (attempt {}/{})",
                delay.as_secs_f64(),
                retry_count,
                max_retries
            ),
            None => warn!(
                error = %error,
                retry_count,
                max_retries,
                "PriceTracker: fetch failed, retries exhausted, waiting for next tick"
            ),
        }

        if let Some(metrics) = &self.metrics {
            metrics
                .fetch_attempts_total
                .with_label_values(&[error.kind()])
                .inc();
            metrics.upstream_connected.set(0.0);
            metrics.retry_count.set(retry_count as i64);
        }

        PollOutcome::Failed { error, retry_in }
    }

    fn persist(&self, quote: &Quote) {
        let Some(sink) = self.sink.clone() else {
            return;
        };
        let metrics = self.metrics.clone();
        let quote = quote.clone();

        tokio::spawn(async move {
            if let Err(e) = sink.record(&quote).await {
                warn!(error = %e, price = quote.price, "PriceTracker: failed to record price");
                if let Some(metrics) = metrics {
                    metrics.persist_failures_total.inc();
                }
            }
        });
    }

    /// Register a subscriber and hand it the current quote, if any.
    pub fn subscribe(&self, subscriber: Arc<dyn PriceSubscriber>) -> SubscriptionHandle {
        let handle = self.registry.insert(subscriber);

        let (sequence, current) = {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            (state.sequence, state.current_quote.clone())
        };
        if let Some(quote) = current {
            self.registry.deliver_to(handle.id(), sequence, &quote);
        }

        self.update_subscriber_gauge();
        handle
    }

    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        handle.unsubscribe();
        self.update_subscriber_gauge();
    }

    fn update_subscriber_gauge(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.subscribers.set(self.registry.len() as i64);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    pub fn state(&self) -> ServiceState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn current_quote(&self) -> Option<Quote> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .current_quote
            .clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .connected
    }

    pub fn retry_count(&self) -> u32 {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .retry_count
    }

    pub fn history(&self, window: Duration) -> Vec<Quote> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .query(window)
    }

    pub fn history_len(&self) -> usize {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn status(&self, running: bool) -> ServiceStatus {
        let state = self.state();
        ServiceStatus {
            connected: state.connected,
            running,
            retry_count: state.retry_count,
            subscribers: self.subscriber_count(),
            history_len: self.history_len(),
            last_update: state.current_quote.map(|q| q.timestamp),
            trend: state.trend,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Enter the terminal state: drop subscribers and mark the upstream disconnected.
    pub fn stop(&self) {
        {
            // Taken under the state lock so no commit can interleave with the flag flip.
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if self.stopped.swap(true, Ordering::AcqRel) {
                return;
            }
            state.connected = false;
        }
        self.registry.clear();

        if let Some(metrics) = &self.metrics {
            metrics.subscribers.set(0);
            metrics.upstream_connected.set(0.0);
        }
        info!("PriceTracker: stopped");
    }
}
