//! Retry scheduling after failed fetches.

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use tokio::time::Duration;

/// Exponential backoff for one failure episode.
///
/// Delay for retry `n` is `min(base * 2^(n-1), ceiling)`. Once more than `max_retries`
/// failures accumulate no extra retry is scheduled and the regular cadence takes over.
/// Any success starts a fresh episode.
pub struct BackoffController {
    builder: ExponentialBuilder,
    delays: ExponentialBackoff,
    max_retries: u32,
    retry_count: u32,
}

impl BackoffController {
    pub fn new(base: Duration, ceiling: Duration, max_retries: u32) -> Self {
        // The first delay is not capped by the builder; clamp it here.
        let builder = ExponentialBuilder::default()
            .with_min_delay(base.min(ceiling))
            .with_max_delay(ceiling)
            .with_factor(2.0)
            .with_max_times(max_retries as usize);

        Self {
            builder,
            delays: builder.build(),
            max_retries,
            retry_count: 0,
        }
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn record_success(&mut self) {
        self.retry_count = 0;
        self.delays = self.builder.build();
    }

    /// Register a failure and return the delay before the extra retry, if one is due.
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.retry_count = self
            .retry_count
            .saturating_add(1)
            .min(self.max_retries.saturating_add(1));
        if self.retry_count > self.max_retries {
            return None;
        }
        self.delays.next()
    }
}
