//! Public facade of the live price distribution service.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::client::FetchClient;
use super::sink::PriceSink;
use super::source::PriceSource;
use super::subscribers::{DeliveryResult, PriceSubscriber, SubscriptionHandle};
use super::tracker::PriceTracker;
use crate::config::{ConfigError, PriceServiceConfig};
use crate::core::scheduler::PricePoller;
use crate::metrics::Metrics;
use crate::models::{Quote, ServiceStatus, SourceStatus};

/// Live BTC price service.
///
/// Constructed explicitly and owned by the host, which controls the lifecycle
/// with [`start`](Self::start) and [`shutdown`](Self::shutdown). Readers may call
/// any accessor concurrently from any task or thread.
pub struct PriceService {
    tracker: Arc<PriceTracker>,
    poller: PricePoller,
}

impl PriceService {
    pub fn new(
        config: PriceServiceConfig,
        sources: Vec<Arc<dyn PriceSource>>,
    ) -> Result<Self, ConfigError> {
        Self::builder(config, sources).build()
    }

    pub fn builder(
        config: PriceServiceConfig,
        sources: Vec<Arc<dyn PriceSource>>,
    ) -> PriceServiceBuilder {
        PriceServiceBuilder {
            config,
            sources,
            sink: None,
            metrics: None,
        }
    }

    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.poller.start().await
    }

    /// Cancel the poller, drop all subscribers and discard any in-flight result.
    pub async fn shutdown(&self) {
        self.poller.stop().await;
        self.tracker.stop();
        info!("PriceService: shut down");
    }

    pub fn subscribe<S>(&self, subscriber: S) -> SubscriptionHandle
    where
        S: PriceSubscriber + 'static,
    {
        self.tracker.subscribe(Arc::new(subscriber))
    }

    /// Subscribe with a plain closure.
    pub fn subscribe_fn<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&Quote) -> DeliveryResult + Send + Sync + 'static,
    {
        self.subscribe(callback)
    }

    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        self.tracker.unsubscribe(handle);
    }

    pub fn current_quote(&self) -> Option<Quote> {
        self.tracker.current_quote()
    }

    pub fn history(&self, window: Duration) -> Vec<Quote> {
        self.tracker.history(window)
    }

    pub fn is_connected(&self) -> bool {
        self.tracker.is_connected()
    }

    pub fn retry_count(&self) -> u32 {
        self.tracker.retry_count()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tracker.subscriber_count()
    }

    pub async fn is_running(&self) -> bool {
        self.poller.is_running().await
    }

    pub async fn status(&self) -> ServiceStatus {
        let running = self.poller.is_running().await;
        self.tracker.status(running)
    }

    pub async fn check_sources(&self) -> Vec<SourceStatus> {
        self.tracker.client().check_sources().await
    }

    pub fn tracker(&self) -> &Arc<PriceTracker> {
        &self.tracker
    }
}

pub struct PriceServiceBuilder {
    config: PriceServiceConfig,
    sources: Vec<Arc<dyn PriceSource>>,
    sink: Option<Arc<dyn PriceSink>>,
    metrics: Option<Arc<Metrics>>,
}

impl PriceServiceBuilder {
    pub fn with_sink(mut self, sink: Arc<dyn PriceSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<PriceService, ConfigError> {
        self.config.validate()?;
        if self.sources.is_empty() {
            return Err(ConfigError::Missing("PRICE_SOURCES"));
        }

        let client = FetchClient::new(
            self.sources,
            self.config.min_fetch_spacing,
            self.config.fetch_timeout,
        );
        let tracker = Arc::new(PriceTracker::new(
            &self.config,
            client,
            self.sink,
            self.metrics,
        ));
        let poller = PricePoller::new(tracker.clone(), self.config.poll_interval);

        Ok(PriceService { tracker, poller })
    }
}
