//! Time-bounded rolling history of quotes.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::VecDeque;
use std::time::Duration;

use crate::models::Quote;

/// Quotes in insertion (= time) order, bounded by age rather than count.
#[derive(Debug)]
pub struct HistoryBuffer {
    entries: VecDeque<Quote>,
    retention: ChronoDuration,
}

impl HistoryBuffer {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            retention: to_chrono(retention),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&Quote> {
        self.entries.back()
    }

    pub fn append(&mut self, quote: Quote) {
        self.append_at(quote, Utc::now());
    }

    /// Append, then evict everything older than the retention window relative to `now`.
    pub fn append_at(&mut self, quote: Quote, now: DateTime<Utc>) {
        self.entries.push_back(quote);

        let Some(cutoff) = now.checked_sub_signed(self.retention) else {
            return;
        };
        while self
            .entries
            .front()
            .is_some_and(|oldest| oldest.timestamp < cutoff)
        {
            self.entries.pop_front();
        }
    }

    pub fn query(&self, window: Duration) -> Vec<Quote> {
        self.query_at(window, Utc::now())
    }

    /// All retained entries with `timestamp >= now - window`, oldest first.
    pub fn query_at(&self, window: Duration, now: DateTime<Utc>) -> Vec<Quote> {
        let cutoff = now
            .checked_sub_signed(to_chrono(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let start = self.entries.partition_point(|q| q.timestamp < cutoff);
        self.entries.range(start..).cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn to_chrono(d: Duration) -> ChronoDuration {
    ChronoDuration::from_std(d).unwrap_or(ChronoDuration::MAX)
}
