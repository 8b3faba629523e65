use dashmap::{DashMap, mapref::entry::Entry};
use log::debug;
use std::sync::Arc;

use super::{RateLimitConfig, RateLimiter, ServiceKey};
use crate::Result;

/// Hands out one shared [`RateLimiter`] per service.
///
/// Limiters are created lazily on first use. Every facade instance built
/// from the same session asks the pool for its limiter, so all clients of a
/// service draw from the same budget. The first configuration seen for a
/// service wins.
#[derive(Debug, Clone, Default)]
pub struct RateLimiterPool {
    limiters: Arc<DashMap<ServiceKey, Arc<RateLimiter>>>,
}

impl RateLimiterPool {
    /// Create an empty pool
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the limiter for `key`, creating it from `config` if it does not
    /// exist yet.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` is invalid, even if a
    /// limiter for `key` already exists.
    pub fn get_or_create(
        &self,
        key: ServiceKey,
        config: &RateLimitConfig,
    ) -> Result<Arc<RateLimiter>> {
        config.validate()?;

        if let Some(limiter) = self.limiters.get(&key) {
            return Ok(Arc::clone(&limiter));
        }

        // Handle the race where another client created the limiter meanwhile
        match self.limiters.entry(key) {
            Entry::Occupied(entry) => {
                let limiter = entry.get();
                if limiter.limit() != config.requests_per_second
                    || limiter.period() != config.period
                {
                    debug!(
                        "{}: keeping existing limit of {} per {:?}",
                        entry.key(),
                        limiter.limit(),
                        limiter.period()
                    );
                }
                Ok(Arc::clone(limiter))
            }
            Entry::Vacant(entry) => {
                let limiter = Arc::new(RateLimiter::new(entry.key().clone(), config)?);
                Ok(Arc::clone(entry.insert(limiter).value()))
            }
        }
    }

    /// The limiter of a service, if one has been created
    #[must_use]
    pub fn get(&self, key: &ServiceKey) -> Option<Arc<RateLimiter>> {
        self.limiters.get(key).map(|limiter| Arc::clone(&limiter))
    }

    /// Number of services with a limiter
    #[must_use]
    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    /// Whether no limiter has been created yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }
}
