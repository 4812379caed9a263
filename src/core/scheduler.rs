//! Timer-driven poller that drives the price tracker

use crate::services::price::{PollOutcome, PriceTracker};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::time::{interval, sleep, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Scheduler that polls the upstream on a fixed cadence and arms a single
/// backoff retry after failures.
///
/// `stop` is terminal: the loop is signalled, its task aborted, and the
/// tracker discards any result that arrives afterwards.
pub struct PricePoller {
    tracker: Arc<PriceTracker>,
    poll_interval: Duration,
    shutdown: watch::Sender<bool>,
    handle: Arc<RwLock<Option<tokio::task::JoinHandle<()>>>>,
}

impl PricePoller {
    /// Create a new poller
    ///
    /// # Arguments
    /// * `tracker` - State machine the poller drives
    /// * `poll_interval` - Regular cadence between fetch attempts (must be non-zero)
    pub fn new(tracker: Arc<PriceTracker>, poll_interval: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            tracker,
            poll_interval,
            shutdown,
            handle: Arc::new(RwLock::new(None)),
        }
    }

    /// Start the poller; the first fetch is issued immediately
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if *self.shutdown.borrow() || self.tracker.is_stopped() {
            return Err("PricePoller: cannot start after shutdown".into());
        }

        let mut handle = self.handle.write().await;
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            warn!("PricePoller: already running");
            return Ok(());
        }

        let tracker = self.tracker.clone();
        let poll_interval = self.poll_interval;
        let shutdown = self.shutdown.subscribe();
        *handle = Some(tokio::spawn(run_loop(tracker, poll_interval, shutdown)));

        info!(
            poll_interval_ms = poll_interval.as_millis() as u64,
            "PricePoller: started with interval {}ms",
            poll_interval.as_millis()
        );
        Ok(())
    }

    /// Stop the poller; no further ticks fire afterwards
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);
        let mut handle = self.handle.write().await;
        if let Some(h) = handle.take() {
            h.abort();
            info!("PricePoller: stopped");
        }
    }

    /// Check if the poller task is alive
    pub async fn is_running(&self) -> bool {
        let handle = self.handle.read().await;
        handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

async fn run_loop(
    tracker: Arc<PriceTracker>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let retry = sleep(Duration::ZERO);
    tokio::pin!(retry);
    let mut retry_armed = false;

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                debug!("PricePoller: cadence tick");
            }
            _ = &mut retry, if retry_armed => {
                retry_armed = false;
                debug!("PricePoller: backoff retry");
            }
        }

        let outcome = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            outcome = tracker.poll_once() => outcome,
        };

        match outcome {
            PollOutcome::Updated(_) => retry_armed = false,
            PollOutcome::Failed {
                retry_in: Some(delay),
                ..
            } => {
                retry.as_mut().reset(Instant::now() + delay);
                retry_armed = true;
            }
            PollOutcome::Failed { retry_in: None, .. } => retry_armed = false,
            PollOutcome::Throttled => {}
            PollOutcome::Discarded => break,
        }
    }

    debug!("PricePoller: loop exited");
}
