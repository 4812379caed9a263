//! Read-only HTTP surface over the price service using Axum

use axum::{
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

use crate::metrics::Metrics;
use crate::models::{Quote, ServiceStatus};
use crate::services::price::PriceService;

const DEFAULT_HISTORY_MINUTES: u64 = 60;

#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<Metrics>,
    pub start_time: Arc<Instant>,
    pub price_service: Arc<PriceService>,
}

impl AppState {
    pub fn new(price_service: Arc<PriceService>, metrics: Arc<Metrics>) -> Self {
        Self {
            metrics,
            start_time: Arc::new(Instant::now()),
            price_service,
        }
    }
}

/// `healthy` while the poller runs and the last fetch succeeded, `degraded` while the
/// upstream is failing, `stopped` once the poller is gone.
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let running = state.price_service.is_running().await;
    let connected = state.price_service.is_connected();
    let status = match (running, connected) {
        (false, _) => "stopped",
        (true, true) => "healthy",
        (true, false) => "degraded",
    };

    Json(json!({
        "status": status,
        "uptime_seconds": state.start_time.elapsed().as_secs(),
        "upstream_connected": connected,
        "running": running,
        "retry_count": state.price_service.retry_count(),
        "service": "btc-pulse-price-service"
    }))
}

pub async fn metrics_handler(State(state): State<AppState>) -> Result<String, StatusCode> {
    state
        .metrics
        .export()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Middleware to track HTTP request metrics
async fn metrics_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    state.metrics.http_requests_in_flight.inc();
    let response = next.run(request).await;
    let status = response.status();
    let duration = start.elapsed();
    state.metrics.http_requests_in_flight.dec();

    state.metrics.http_requests_total.inc();
    state
        .metrics
        .http_request_duration_seconds
        .observe(duration.as_secs_f64());

    if status.is_server_error() {
        tracing::error!(
            method = %method,
            path = %path,
            status = %status,
            duration_ms = duration.as_millis(),
            "HTTP request error"
        );
    }

    response
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    minutes: Option<u64>,
}

/// Latest quote, 404 until the first successful fetch
async fn current_price(State(state): State<AppState>) -> Result<Json<Quote>, StatusCode> {
    state
        .price_service
        .current_quote()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn price_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryQuery>,
) -> Json<Value> {
    let minutes = params.minutes.unwrap_or(DEFAULT_HISTORY_MINUTES);
    let window = Duration::from_secs(minutes.saturating_mul(60));
    let quotes = state.price_service.history(window);

    Json(json!({
        "minutes": minutes,
        "count": quotes.len(),
        "quotes": quotes,
    }))
}

async fn price_status(State(state): State<AppState>) -> Json<ServiceStatus> {
    Json(state.price_service.status().await)
}

/// Probe every configured upstream; does not touch service state
async fn source_status(State(state): State<AppState>) -> Json<Value> {
    let sources = state.price_service.check_sources().await;
    let healthy = sources.iter().filter(|s| s.ok).count();

    Json(json!({
        "healthy": healthy,
        "total": sources.len(),
        "sources": sources,
    }))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/api/price/current", get(current_price))
        .route("/api/price/history", get(price_history))
        .route("/api/price/status", get(price_status))
        .route("/api/price/sources", get(source_status))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                        .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
                )
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    metrics_middleware,
                ))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

pub async fn start_server(
    port: u16,
    state: AppState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!(port = port, "HTTP server listening on port {}", port);
    info!(
        "Metrics endpoint available at http://0.0.0.0:{}/metrics",
        port
    );
    axum::serve(listener, app).await?;

    Ok(())
}
