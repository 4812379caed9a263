//! Unit tests for environment-driven configuration

use btc_pulse::config::{
    price_sources_from_lookup, ConfigError, PriceServiceConfig, DEFAULT_MAX_RETRIES,
};
use btc_pulse::services::price::SourceFormat;
use std::collections::HashMap;
use std::time::Duration;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

#[test]
fn test_defaults_when_unset() {
    let config = PriceServiceConfig::from_lookup(lookup(&[])).unwrap();

    assert_eq!(config, PriceServiceConfig::default());
    assert_eq!(config.poll_interval, Duration::from_secs(5));
    assert_eq!(config.min_fetch_spacing, Duration::from_secs(2));
    assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
    assert_eq!(config.backoff_ceiling, Duration::from_secs(30));
    assert_eq!(config.history_retention, Duration::from_secs(24 * 60 * 60));
}

#[test]
fn test_overrides_are_parsed() {
    let config = PriceServiceConfig::from_lookup(lookup(&[
        ("POLL_INTERVAL_MS", "1000"),
        ("MIN_FETCH_SPACING_MS", "0"),
        ("MAX_RETRIES", " 5 "),
        ("BACKOFF_CEILING_MS", "60000"),
        ("FETCH_TIMEOUT_MS", "2500"),
    ]))
    .unwrap();

    assert_eq!(config.poll_interval, Duration::from_secs(1));
    assert_eq!(config.min_fetch_spacing, Duration::ZERO);
    assert_eq!(config.max_retries, 5);
    assert_eq!(config.backoff_ceiling, Duration::from_secs(60));
    assert_eq!(config.fetch_timeout, Duration::from_millis(2500));
}

#[test]
fn test_zero_poll_interval_rejected() {
    let err = PriceServiceConfig::from_lookup(lookup(&[("POLL_INTERVAL_MS", "0")])).unwrap_err();
    assert_eq!(
        err,
        ConfigError::NotPositive {
            key: "POLL_INTERVAL_MS"
        }
    );
}

#[test]
fn test_negative_or_garbage_values_rejected() {
    for raw in ["-5000", "5s", ""] {
        let err =
            PriceServiceConfig::from_lookup(lookup(&[("POLL_INTERVAL_MS", raw)])).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { key: "POLL_INTERVAL_MS", .. }),
            "{:?} for {:?}",
            err,
            raw
        );
    }
}

#[test]
fn test_validate_catches_hand_built_config() {
    let config = PriceServiceConfig {
        history_retention: Duration::ZERO,
        ..PriceServiceConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_generic_source_requires_url() {
    let err = price_sources_from_lookup(lookup(&[])).unwrap_err();
    assert_eq!(err, ConfigError::Missing("PRICE_SOURCE_URL"));

    let specs =
        price_sources_from_lookup(lookup(&[("PRICE_SOURCE_URL", "http://localhost:9000/btc")]))
            .unwrap();
    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].format, SourceFormat::Generic);
    assert_eq!(specs[0].url.as_str(), "http://localhost:9000/btc");
}

#[test]
fn test_named_sources_keep_order() {
    let specs = price_sources_from_lookup(lookup(&[("PRICE_SOURCES", "Binance, coingecko")]))
        .unwrap();

    let formats: Vec<_> = specs.iter().map(|s| s.format).collect();
    assert_eq!(formats, vec![SourceFormat::Binance, SourceFormat::CoinGecko]);
    assert!(specs.iter().all(|s| s.url.scheme() == "https"));
}

#[test]
fn test_unknown_source_rejected() {
    let err = price_sources_from_lookup(lookup(&[("PRICE_SOURCES", "kraken")])).unwrap_err();
    assert!(matches!(err, ConfigError::UnknownSource(_)));
}

#[test]
fn test_empty_source_list_rejected() {
    let err = price_sources_from_lookup(lookup(&[("PRICE_SOURCES", " , ")])).unwrap_err();
    assert_eq!(err, ConfigError::Missing("PRICE_SOURCES"));
}

#[test]
fn test_non_http_source_url_rejected() {
    let err = price_sources_from_lookup(lookup(&[("PRICE_SOURCE_URL", "ftp://example.com/btc")]))
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigError::InvalidUrl {
            key: "PRICE_SOURCE_URL",
            ..
        }
    ));
}
