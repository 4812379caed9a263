//! BTC Pulse Price Service
//!
//! Polls the configured upstream price sources, keeps a rolling 24h history
//! and serves a read-only HTTP API over the live price state.

use btc_pulse::config::{self, PriceServiceConfig};
use btc_pulse::core::http::{start_server, AppState};
use btc_pulse::logging;
use btc_pulse::metrics::Metrics;
use btc_pulse::services::price::{
    HttpPriceSink, HttpPriceSource, PriceService, PriceSink, PriceSource,
};
use dotenvy::dotenv;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env if present
    dotenv().ok();

    logging::init_logging();

    let env = config::get_environment();
    let port = config::get_port();
    let service_config = PriceServiceConfig::from_env()?;
    let source_specs = config::get_price_sources()?;
    let sink_url = config::get_sink_url()?;

    info!("Starting BTC Pulse Price Service");
    info!(environment = %env, "Environment");
    info!(
        poll_interval_ms = service_config.poll_interval.as_millis() as u64,
        min_fetch_spacing_ms = service_config.min_fetch_spacing.as_millis() as u64,
        max_retries = service_config.max_retries,
        backoff_ceiling_ms = service_config.backoff_ceiling.as_millis() as u64,
        "Price poller configuration"
    );

    let client = reqwest::Client::new();
    let sources: Vec<Arc<dyn PriceSource>> = source_specs
        .into_iter()
        .map(|spec| {
            info!(source = %spec.format, url = %spec.url, "Using price source {}", spec.format);
            Arc::new(HttpPriceSource::with_client(spec.format, spec.url, client.clone()))
                as Arc<dyn PriceSource>
        })
        .collect();

    let metrics = Arc::new(Metrics::new()?);
    let mut builder = PriceService::builder(service_config, sources).with_metrics(metrics.clone());
    match sink_url {
        Some(url) => {
            info!(url = %url, "Recording prices to {}", url);
            let sink: Arc<dyn PriceSink> = Arc::new(HttpPriceSink::with_client(url, client));
            builder = builder.with_sink(sink);
        }
        None => info!("PRICE_SINK_URL not set - prices will not be recorded"),
    }

    let price_service = Arc::new(builder.build()?);
    price_service
        .start()
        .await
        .map_err(|e| format!("Failed to start price poller: {}", e))?;

    let state = AppState::new(price_service.clone(), metrics);
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(port, state).await {
            error!(error = %e, "HTTP server error");
        }
    });

    info!("Price service started, waiting for shutdown signal...");
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Shutting down price service...");
        }
        _ = server_handle => {
            error!("HTTP server stopped");
        }
    }

    price_service.shutdown().await;
    info!("Price service stopped");

    Ok(())
}
