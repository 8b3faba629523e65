use std::sync::Arc;

use dashmap::DashMap;
use http::StatusCode;
use log::{debug, warn};
use tokio::sync::Mutex;

use crate::{
    CacheKey, CacheStore, ErrorKind, LogicalRequest, Payload, Result,
    ratelimit::RateLimiter,
    stats::{DispatchStats, StatsRecorder},
    transport::Transport,
};

/// Where a payload came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Read from the on-disk cache, no network call was made
    Cache,
    /// Fetched from the remote service
    Network,
}

/// Runs a single [`LogicalRequest`]: cache lookup, rate limiter admission,
/// network call and cache write, in this order.
///
/// Cache hits never reach the rate limiter. A `404 Not Found` is an empty
/// payload (and cached as such), every other status outside of 2xx is an
/// [`ErrorKind::RejectedStatusCode`]. Errors are returned as they are, the
/// dispatcher never retries.
///
/// Identical cacheable requests running at the same time make a single
/// network call: later ones wait for the first and read its payload from the
/// cache. If the first one fails, the next waiter makes its own attempt.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    cache: Option<CacheStore>,
    limiter: Arc<RateLimiter>,
    stats: Arc<StatsRecorder>,
    in_flight: Arc<InFlight>,
}

type InFlight = DashMap<CacheKey, Arc<Mutex<()>>>;

/// Membership of one request in the [`InFlight`] map, removed again when the
/// last request for the key is done or dropped
struct Flight<'a> {
    in_flight: &'a InFlight,
    key: &'a CacheKey,
    lock: Arc<Mutex<()>>,
}

impl<'a> Flight<'a> {
    fn join(in_flight: &'a InFlight, key: &'a CacheKey) -> Self {
        let lock = Arc::clone(in_flight.entry(key.clone()).or_default().value());
        Self {
            in_flight,
            key,
            lock,
        }
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        // One reference in the map, one in `self`
        self.in_flight.remove_if(self.key, |_, lock| {
            Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2
        });
    }
}

impl Dispatcher {
    /// Create a dispatcher. Pass no cache to disable caching.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: Option<CacheStore>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            transport,
            cache,
            limiter,
            stats: Arc::default(),
            in_flight: Arc::default(),
        }
    }

    /// Fetch the payload for `request`.
    ///
    /// # Errors
    ///
    /// Returns an `Err` if the transport fails or the service answers with
    /// an error status other than `404`.
    pub async fn execute(&self, request: &LogicalRequest) -> Result<Payload> {
        self.dispatch(request).await.map(|(payload, _)| payload)
    }

    /// Like [`Dispatcher::execute`], but also reports where the payload came from.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::execute`].
    pub async fn dispatch(&self, request: &LogicalRequest) -> Result<(Payload, Source)> {
        let Some(cache) = self.cache.as_ref().filter(|_| !request.cache_bypass()) else {
            return self.fetch(request).await.map(|payload| (payload, Source::Network));
        };
        let key = request.cache_key();
        if let Some(payload) = self.lookup(cache, &key, request) {
            return Ok((payload, Source::Cache));
        }

        let flight = Flight::join(&self.in_flight, &key);
        let _running = flight.lock.lock().await;

        // Filled by an identical request while this one was waiting
        if let Some(payload) = self.lookup(cache, &key, request) {
            return Ok((payload, Source::Cache));
        }
        self.stats.record_cache_miss();

        let payload = self.fetch(request).await?;
        if let Err(e) = cache.store(&key, &payload) {
            warn!("{request}: response not cached: {e}");
        }
        Ok((payload, Source::Network))
    }

    fn lookup(
        &self,
        cache: &CacheStore,
        key: &CacheKey,
        request: &LogicalRequest,
    ) -> Option<Payload> {
        let payload = cache.lookup(key)?;
        debug!("{request}: served from cache");
        self.stats.record_cache_hit();
        Some(payload)
    }

    /// Admission and network call, without any caching
    async fn fetch(&self, request: &LogicalRequest) -> Result<Payload> {
        self.limiter.admit().await;
        self.stats.record_network_request();
        debug!("{request}: sending");

        let response = self
            .transport
            .send(
                request.method(),
                request.url(),
                request.headers(),
                request.body(),
            )
            .await
            .inspect_err(|_| self.stats.record_failure())?;

        match response.status {
            status if status.is_success() => Ok(response.body),
            StatusCode::NOT_FOUND => {
                debug!("{request}: not found");
                self.stats.record_not_found();
                Ok(Payload::new())
            }
            status => {
                self.stats.record_failure();
                Err(ErrorKind::RejectedStatusCode {
                    url: request.url().clone(),
                    status,
                    body: response.body,
                })
            }
        }
    }

    /// The limiter all network calls of this dispatcher pass through
    #[must_use]
    pub const fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Whether responses are read from and written to a cache
    #[must_use]
    pub const fn cache_enabled(&self) -> bool {
        self.cache.is_some()
    }

    /// Counters of all requests run by this dispatcher and its clones
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        self.stats.snapshot()
    }
}
