//! Round-trip times of calls to the quote service.
//!
//! `HttpQuoteClient` observes every lookup, found or not, and `/health` plus
//! `/stats/latency` read a millisecond summary back out.

use std::sync::Mutex;
use std::time::Duration;

use hdrhistogram::Histogram;
use serde::Serialize;

/// Slowest lookup the histogram resolves, in microseconds. The client times
/// out long before this.
const MAX_LOOKUP_US: u64 = 60_000_000;

pub struct QuoteLatency {
    lookups_us: Mutex<Histogram<u64>>,
}

/// Percentiles of quote lookups in milliseconds. All `None` until the first lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
    pub sample_count: u64,
}

impl QuoteLatency {
    pub fn new() -> Self {
        Self {
            lookups_us: Mutex::new(lookup_histogram()),
        }
    }

    /// Record one lookup. Sub-microsecond lookups count as 1us; anything past
    /// the ceiling is pinned to it.
    pub fn observe(&self, elapsed: Duration) {
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        if let Ok(mut h) = self.lookups_us.lock() {
            h.saturating_record(us.clamp(1, MAX_LOOKUP_US));
        }
    }

    pub fn summary(&self) -> LatencySummary {
        let Ok(h) = self.lookups_us.lock() else {
            return LatencySummary::default();
        };
        if h.is_empty() {
            return LatencySummary::default();
        }
        let ms = |q: f64| Some(h.value_at_quantile(q) as f64 / 1000.0);
        LatencySummary {
            p50_ms: ms(0.50),
            p95_ms: ms(0.95),
            p99_ms: ms(0.99),
            sample_count: h.len(),
        }
    }
}

impl Default for QuoteLatency {
    fn default() -> Self {
        Self::new()
    }
}

fn lookup_histogram() -> Histogram<u64> {
    match Histogram::new_with_bounds(1, MAX_LOOKUP_US, 3) {
        Ok(h) => h,
        Err(_) => unreachable!("constant histogram bounds are valid"),
    }
}
