//! Shared health state for the /health endpoint.
//! Updated by the quote client, read by the API.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct HealthState {
    /// Nanosecond timestamp of the last successful quote lookup (0 = none).
    pub last_quote_at_ns: AtomicU64,
    /// Lookups that ended in a transport or upstream error.
    pub quote_failures: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_last_quote_at_ns(&self, ns: u64) {
        self.last_quote_at_ns.store(ns, Ordering::Relaxed);
    }

    pub fn inc_quote_failures(&self) {
        self.quote_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_quote_at_ns(&self) -> u64 {
        self.last_quote_at_ns.load(Ordering::Relaxed)
    }

    pub fn quote_failures(&self) -> u64 {
        self.quote_failures.load(Ordering::Relaxed)
    }
}
