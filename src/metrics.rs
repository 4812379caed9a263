//! Prometheus metrics for the price service and its HTTP surface.

use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};

pub struct Metrics {
    registry: Registry,
    pub fetch_attempts_total: IntCounterVec,
    pub upstream_connected: Gauge,
    pub retry_count: IntGauge,
    pub subscribers: IntGauge,
    pub history_entries: IntGauge,
    pub subscriber_failures_total: IntCounter,
    pub persist_failures_total: IntCounter,
    pub http_requests_total: IntCounter,
    pub http_requests_in_flight: IntGauge,
    pub http_request_duration_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let fetch_attempts_total = IntCounterVec::new(
            Opts::new(
                "price_fetch_attempts_total",
                "Upstream price fetch attempts by outcome",
            ),
            &["outcome"],
        )?;
        let upstream_connected = Gauge::new(
            "price_upstream_connected",
            "1 if the most recent fetch succeeded, 0 otherwise",
        )?;
        let retry_count = IntGauge::new(
            "price_retry_count",
            "Consecutive failures in the current backoff episode",
        )?;
        let subscribers = IntGauge::new("price_subscribers", "Registered price subscribers")?;
        let history_entries =
            IntGauge::new("price_history_entries", "Quotes held in the rolling history")?;
        let subscriber_failures_total = IntCounter::new(
            "price_subscriber_failures_total",
            "Deliveries where a subscriber returned an error or panicked",
        )?;
        let persist_failures_total = IntCounter::new(
            "price_persist_failures_total",
            "Quotes the persistence sink failed to record",
        )?;
        let http_requests_total =
            IntCounter::new("http_requests_total", "Total HTTP requests served")?;
        let http_requests_in_flight =
            IntGauge::new("http_requests_in_flight", "HTTP requests currently in flight")?;
        let http_request_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request latency in seconds",
        ))?;

        registry.register(Box::new(fetch_attempts_total.clone()))?;
        registry.register(Box::new(upstream_connected.clone()))?;
        registry.register(Box::new(retry_count.clone()))?;
        registry.register(Box::new(subscribers.clone()))?;
        registry.register(Box::new(history_entries.clone()))?;
        registry.register(Box::new(subscriber_failures_total.clone()))?;
        registry.register(Box::new(persist_failures_total.clone()))?;
        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_requests_in_flight.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            fetch_attempts_total,
            upstream_connected,
            retry_count,
            subscribers,
            history_entries,
            subscriber_failures_total,
            persist_failures_total,
            http_requests_total,
            http_requests_in_flight,
            http_request_duration_seconds,
        })
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn export(&self) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
