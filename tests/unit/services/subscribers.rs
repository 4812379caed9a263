//! Unit tests for the subscriber registry

use btc_pulse::models::Quote;
use btc_pulse::services::price::{
    ChannelSubscriber, DeliveryOutcome, DeliveryResult, PriceSubscriber, SubscriberRegistry,
};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::common::quote_at;

#[derive(Default)]
struct Recorder {
    prices: Mutex<Vec<f64>>,
}

impl PriceSubscriber for Recorder {
    fn on_quote(&self, quote: &Quote) -> DeliveryResult {
        self.prices.lock().unwrap().push(quote.price);
        Ok(())
    }
}

impl Recorder {
    fn prices(&self) -> Vec<f64> {
        self.prices.lock().unwrap().clone()
    }
}

struct Failing;

impl PriceSubscriber for Failing {
    fn on_quote(&self, _quote: &Quote) -> DeliveryResult {
        Err("subscriber is broken".into())
    }
}

struct Panicking;

impl PriceSubscriber for Panicking {
    fn on_quote(&self, _quote: &Quote) -> DeliveryResult {
        panic!("subscriber blew up");
    }
}

#[test]
fn test_broadcast_reaches_every_subscriber() {
    let registry = Arc::new(SubscriberRegistry::new());
    let a = Arc::new(Recorder::default());
    let b = Arc::new(Recorder::default());
    registry.insert(a.clone());
    registry.insert(b.clone());

    let report = registry.broadcast(1, &quote_at(100.0, 0));

    assert_eq!(report.delivered, 2);
    assert_eq!(a.prices(), vec![100.0]);
    assert_eq!(b.prices(), vec![100.0]);
}

#[test]
fn test_failing_and_panicking_subscribers_are_isolated() {
    let registry = Arc::new(SubscriberRegistry::new());
    let healthy = Arc::new(Recorder::default());
    registry.insert(Arc::new(Failing));
    registry.insert(Arc::new(Panicking));
    registry.insert(healthy.clone());

    let first = registry.broadcast(1, &quote_at(100.0, 0));
    let second = registry.broadcast(2, &quote_at(101.0, 5));

    assert_eq!(first.delivered, 1);
    assert_eq!(first.failed, 2);
    assert_eq!(second.failed, 2);
    assert_eq!(healthy.prices(), vec![100.0, 101.0]);
}

#[test]
fn test_stale_or_repeated_sequences_are_skipped() {
    let registry = Arc::new(SubscriberRegistry::new());
    let recorder = Arc::new(Recorder::default());
    let handle = registry.insert(recorder.clone());

    assert_eq!(
        registry.deliver_to(handle.id(), 2, &quote_at(102.0, 10)),
        DeliveryOutcome::Delivered
    );
    // Same quote arriving through the broadcast path.
    assert_eq!(registry.broadcast(2, &quote_at(102.0, 10)).skipped, 1);
    // An older quote must never follow a newer one.
    assert_eq!(
        registry.deliver_to(handle.id(), 1, &quote_at(101.0, 5)),
        DeliveryOutcome::Skipped
    );

    assert_eq!(recorder.prices(), vec![102.0]);
}

#[test]
fn test_unsubscribe_is_idempotent() {
    let registry = Arc::new(SubscriberRegistry::new());
    let recorder = Arc::new(Recorder::default());
    let handle = registry.insert(recorder.clone());

    handle.unsubscribe();
    handle.unsubscribe();
    assert!(!registry.remove(handle.id()));
    assert!(registry.is_empty());

    registry.broadcast(1, &quote_at(100.0, 0));
    assert!(recorder.prices().is_empty());
}

#[test]
fn test_handle_outliving_registry_is_harmless() {
    let registry = Arc::new(SubscriberRegistry::new());
    let handle = registry.insert(Arc::new(Recorder::default()));
    drop(registry);

    handle.unsubscribe();
}

#[test]
fn test_channel_subscriber_forwards_quotes() {
    let registry = Arc::new(SubscriberRegistry::new());
    let (subscriber, mut rx) = ChannelSubscriber::channel();
    registry.insert(Arc::new(subscriber));

    registry.broadcast(1, &quote_at(100.0, 0));
    registry.broadcast(2, &quote_at(101.0, 5));

    assert_eq!(rx.try_recv().unwrap().price, 100.0);
    assert_eq!(rx.try_recv().unwrap().price, 101.0);

    drop(rx);
    let report = registry.broadcast(3, &quote_at(102.0, 10));
    assert_eq!(report.failed, 1);
}

#[test]
fn test_concurrent_churn_keeps_per_subscriber_order() {
    let registry = Arc::new(SubscriberRegistry::new());
    let stable = Arc::new(Recorder::default());
    registry.insert(stable.clone());

    thread::scope(|scope| {
        let broadcaster = registry.clone();
        scope.spawn(move || {
            for seq in 1..=500u64 {
                broadcaster.broadcast(seq, &quote_at(seq as f64, seq as i64));
            }
        });

        for _ in 0..4 {
            let churn = registry.clone();
            scope.spawn(move || {
                for _ in 0..200 {
                    let recorder = Arc::new(Recorder::default());
                    let handle = churn.insert(recorder.clone());
                    handle.unsubscribe();
                    let seen = recorder.prices();
                    assert!(seen.windows(2).all(|w| w[0] < w[1]));
                }
            });
        }
    });

    let seen = stable.prices();
    assert_eq!(seen.len(), 500);
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(registry.len(), 1);
}
