//! Subscriber registry and quote fan-out.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::models::Quote;

pub type DeliveryResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

pub type SubscriptionId = u64;

/// Receives quotes from the price service.
///
/// Called synchronously from the poller task; implementations should return quickly.
/// Errors and panics are contained to the failing subscriber.
pub trait PriceSubscriber: Send + Sync {
    fn on_quote(&self, quote: &Quote) -> DeliveryResult;
}

impl<F> PriceSubscriber for F
where
    F: Fn(&Quote) -> DeliveryResult + Send + Sync,
{
    fn on_quote(&self, quote: &Quote) -> DeliveryResult {
        self(quote)
    }
}

/// Forwards quotes into an unbounded channel for async consumers.
pub struct ChannelSubscriber {
    tx: mpsc::UnboundedSender<Quote>,
}

impl ChannelSubscriber {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Quote>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl PriceSubscriber for ChannelSubscriber {
    fn on_quote(&self, quote: &Quote) -> DeliveryResult {
        self.tx
            .send(quote.clone())
            .map_err(|_| "channel receiver dropped".into())
    }
}

struct Slot {
    subscriber: Arc<dyn PriceSubscriber>,
    active: AtomicBool,
    // Sequence of the last quote handed to this subscriber; 0 = none yet.
    last_sequence: Mutex<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed,
    Skipped,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Handle returned by `subscribe`; `unsubscribe` is idempotent.
#[derive(Clone)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    registry: Weak<SubscriberRegistry>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle").field("id", &self.id).finish()
    }
}

/// Mapping from subscription id to subscriber.
///
/// Broadcasts iterate over a snapshot of the slots, so `insert`/`remove` may run
/// concurrently from any thread. Each slot remembers the last sequence it received
/// and drops anything not newer, which keeps per-subscriber delivery strictly ordered
/// and duplicate-free even when an initial delivery races a broadcast.
#[derive(Default)]
pub struct SubscriberRegistry {
    next_id: AtomicU64,
    slots: RwLock<HashMap<SubscriptionId, Arc<Slot>>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(self: &Arc<Self>, subscriber: Arc<dyn PriceSubscriber>) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let slot = Arc::new(Slot {
            subscriber,
            active: AtomicBool::new(true),
            last_sequence: Mutex::new(0),
        });

        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, slot);
        debug!(subscription_id = id, "SubscriberRegistry: subscriber added");

        SubscriptionHandle {
            id,
            registry: Arc::downgrade(self),
        }
    }

    /// Returns `false` if the id was not registered.
    pub fn remove(&self, id: SubscriptionId) -> bool {
        let removed = self
            .slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);

        match removed {
            Some(slot) => {
                slot.active.store(false, Ordering::Release);
                debug!(subscription_id = id, "SubscriberRegistry: subscriber removed");
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let drained: Vec<_> = self
            .slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        for (_, slot) in drained {
            slot.active.store(false, Ordering::Release);
        }
    }

    /// Deliver a single quote to one subscriber (used for the initial snapshot).
    pub fn deliver_to(&self, id: SubscriptionId, sequence: u64, quote: &Quote) -> DeliveryOutcome {
        let slot = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned();

        match slot {
            Some(slot) => deliver(id, &slot, sequence, quote),
            None => DeliveryOutcome::Skipped,
        }
    }

    pub fn broadcast(&self, sequence: u64, quote: &Quote) -> BroadcastReport {
        let snapshot: Vec<(SubscriptionId, Arc<Slot>)> = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, slot)| (*id, slot.clone()))
            .collect();

        let mut report = BroadcastReport::default();
        for (id, slot) in snapshot {
            match deliver(id, &slot, sequence, quote) {
                DeliveryOutcome::Delivered => report.delivered += 1,
                DeliveryOutcome::Failed => report.failed += 1,
                DeliveryOutcome::Skipped => report.skipped += 1,
            }
        }
        report
    }
}

fn deliver(id: SubscriptionId, slot: &Slot, sequence: u64, quote: &Quote) -> DeliveryOutcome {
    let mut last = slot
        .last_sequence
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    if sequence <= *last || !slot.active.load(Ordering::Acquire) {
        return DeliveryOutcome::Skipped;
    }
    *last = sequence;

    match catch_unwind(AssertUnwindSafe(|| slot.subscriber.on_quote(quote))) {
        Ok(Ok(())) => DeliveryOutcome::Delivered,
        Ok(Err(e)) => {
            warn!(
                subscription_id = id,
                error = %e,
                "SubscriberRegistry: subscriber returned an error"
            );
            DeliveryOutcome::Failed
        }
        Err(payload) => {
            error!(
                subscription_id = id,
                panic = %panic_message(payload.as_ref()),
                "SubscriberRegistry: subscriber panicked during delivery"
            );
            DeliveryOutcome::Failed
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
