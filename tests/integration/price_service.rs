//! End-to-end: real poller, HTTP upstream and recording sink

use btc_pulse::metrics::Metrics;
use btc_pulse::services::price::{ChannelSubscriber, HttpPriceSink, PriceService, PriceSink};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use wiremock::MockServer;

use crate::test_utils::{
    fast_config, generic_source, mock_price, mock_sink, mock_status, url_for, RECORD_PATH,
};

#[tokio::test]
async fn streams_prices_and_records_them() {
    let upstream = MockServer::start().await;
    mock_price(&upstream, 43250.12).await;
    let recorder = MockServer::start().await;
    mock_sink(&recorder).await;

    let metrics = Arc::new(Metrics::new().unwrap());
    let sink: Arc<dyn PriceSink> = Arc::new(HttpPriceSink::new(url_for(&recorder, RECORD_PATH)));
    let service = PriceService::builder(fast_config(), vec![generic_source(&upstream)])
        .with_sink(sink)
        .with_metrics(metrics.clone())
        .build()
        .unwrap();

    let (subscriber, mut updates) = ChannelSubscriber::channel();
    service.subscribe(subscriber);
    service.start().await.unwrap();

    let first = timeout(Duration::from_secs(2), updates.recv())
        .await
        .expect("quote within timeout")
        .expect("channel open");
    assert_eq!(first.price, 43250.12);
    assert_eq!(first.change_24h, 1.5);

    sleep(Duration::from_millis(350)).await;

    assert!(service.is_connected());
    assert!(service.history(Duration::from_secs(60)).len() >= 2);

    let recorded = recorder.received_requests().await.unwrap();
    assert!(!recorded.is_empty());
    let body: Value = recorded[0].body_json().unwrap();
    assert_eq!(body["price"], 43250.12);
    assert!(body["timestamp"].is_i64());

    let exported = metrics.export().unwrap();
    assert!(exported.contains("price_fetch_attempts_total{outcome=\"success\"}"));

    service.shutdown().await;
    assert!(!service.is_running().await);
    assert_eq!(service.subscriber_count(), 0);
}

#[tokio::test]
async fn unavailable_upstream_keeps_service_disconnected() {
    let upstream = MockServer::start().await;
    mock_status(&upstream, 503).await;

    let service = PriceService::new(fast_config(), vec![generic_source(&upstream)]).unwrap();
    service.start().await.unwrap();
    sleep(Duration::from_millis(250)).await;

    assert!(!service.is_connected());
    assert!(service.retry_count() >= 1);
    assert!(service.current_quote().is_none());
    assert!(service.history(Duration::from_secs(60)).is_empty());

    service.shutdown().await;
}

#[tokio::test]
async fn no_requests_after_shutdown() {
    let upstream = MockServer::start().await;
    mock_price(&upstream, 100.0).await;

    let service = PriceService::new(fast_config(), vec![generic_source(&upstream)]).unwrap();
    service.start().await.unwrap();
    sleep(Duration::from_millis(150)).await;
    service.shutdown().await;

    let before = upstream.received_requests().await.unwrap().len();
    sleep(Duration::from_millis(300)).await;
    let after = upstream.received_requests().await.unwrap().len();

    assert!(before >= 1);
    assert_eq!(before, after);
}

#[test]
fn empty_source_list_is_rejected() {
    let result = PriceService::new(fast_config(), Vec::new());
    assert!(result.is_err());
}
