use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters of a [`crate::ServiceClient`], taken at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Requests answered from the on-disk cache
    pub cache_hits: u64,
    /// Cache lookups which found nothing
    pub cache_misses: u64,
    /// Requests sent over the network, including retries
    pub network_requests: u64,
    /// Network requests which failed or got an error status
    pub failures: u64,
    /// Requests answered with `404 Not Found`, counted as empty payloads
    pub not_found: u64,
}

impl DispatchStats {
    /// Share of cache lookups which were hits, between 0 and 1
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cache_hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / lookups as f64
        }
    }
}

/// Lock-free counters shared by all in-flight requests
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    network_requests: AtomicU64,
    failures: AtomicU64,
    not_found: AtomicU64,
}

impl StatsRecorder {
    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_network_request(&self) {
        self.network_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_not_found(&self) {
        self.not_found.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            network_requests: self.network_requests.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
        }
    }
}
