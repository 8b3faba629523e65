use std::{
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use log::trace;
use tokio::time::{Instant, sleep_until};

use super::{RateLimitConfig, ServiceKey, window::Window};
use crate::Result;

/// Admission gate for the network calls to one service.
///
/// The limiter remembers the instants of the last `limit` admissions. A new
/// call is admitted once the oldest of them lies at least one period in the
/// past, so no interval of length `period` ever contains more than `limit`
/// admissions, independent of where the interval starts. Waiting callers
/// sleep on the tokio timer and re-check when the oldest admission leaves
/// the window.
///
/// The check and the recording of an admission happen under the same lock,
/// so concurrent callers cannot over-admit. No fairness between waiting
/// callers is guaranteed.
///
/// The limiter uses the monotonic [`tokio::time::Instant`], which also lets
/// tests drive it with a paused clock.
#[derive(Debug)]
pub struct RateLimiter {
    key: ServiceKey,
    limit: u32,
    period: Duration,
    window: Mutex<Window<Instant>>,
    admitted: AtomicU64,
}

impl RateLimiter {
    /// Create a limiter for the service identified by `key`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` would never admit a request.
    pub fn new(key: ServiceKey, config: &RateLimitConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            key,
            limit: config.requests_per_second,
            period: config.period,
            window: Mutex::new(Window::new(config.requests_per_second as usize)),
            admitted: AtomicU64::new(0),
        })
    }

    /// Wait until a network call may be made, then record it.
    /// Returns the instant the call was admitted at.
    pub async fn admit(&self) -> Instant {
        loop {
            let (wake_at, waiting_behind) = {
                let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
                let now = Instant::now();
                match window.front() {
                    Some(&oldest) if window.is_full() && now < oldest + self.period => {
                        (oldest + self.period, window.len())
                    }
                    _ => {
                        window.push(now);
                        self.admitted.fetch_add(1, Ordering::Relaxed);
                        return now;
                    }
                }
            };

            trace!(
                "{}: {waiting_behind} requests within {:?}, waiting {:?}",
                self.key,
                self.period,
                wake_at.saturating_duration_since(Instant::now())
            );
            sleep_until(wake_at).await;
        }
    }

    /// Total number of admissions so far
    #[must_use]
    pub fn admitted(&self) -> u64 {
        self.admitted.load(Ordering::Relaxed)
    }

    /// Maximum number of admissions per period
    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }

    /// Length of the sliding window
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// The service this limiter belongs to
    #[must_use]
    pub const fn key(&self) -> &ServiceKey {
        &self.key
    }
}
