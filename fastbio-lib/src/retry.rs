use std::{future::Future, time::Duration};

use http::StatusCode;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::{ErrorKind, Result};

/// By default requests are not retried
pub const DEFAULT_MAX_RETRIES: u64 = 0;

/// Initial wait between two attempts, doubled after every retry
pub const DEFAULT_RETRY_WAIT: Duration = Duration::from_secs(1);

/// An extension trait to help determine if a given failure is transient,
/// i.e. whether the same request may succeed when it is sent again.
///
/// Modified from `Retryable` in [reqwest-middleware].
///
/// [reqwest-middleware]: https://github.com/TrueLayer/reqwest-middleware/blob/f854725791ccf4a02c401a26cab3d9db753f468c/reqwest-retry/src/retryable.rs
pub(crate) trait RetryExt {
    fn should_retry(&self) -> bool;
}

impl RetryExt for StatusCode {
    #[allow(clippy::if_same_then_else)]
    fn should_retry(&self) -> bool {
        let status = *self;
        if status.is_server_error() {
            true
        } else if status.is_client_error()
            && status != StatusCode::REQUEST_TIMEOUT
            && status != StatusCode::TOO_MANY_REQUESTS
        {
            false
        } else if status.is_success() {
            false
        } else {
            status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::TOO_MANY_REQUESTS
        }
    }
}

impl RetryExt for ErrorKind {
    /// Connection failures are reported as they are: a service which cannot
    /// be reached usually stays unreachable for the rest of the batch.
    fn should_retry(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::RejectedStatusCode { status, .. } => status.should_retry(),
            _ => false,
        }
    }
}

/// Bounded retries with exponential backoff.
///
/// The first retry waits `wait`, every further retry waits twice as long as
/// the one before.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicy {
    /// Maximum number of attempts after the first one
    #[serde(default)]
    pub max_retries: u64,

    /// Wait before the first retry
    #[serde(default = "default_retry_wait", with = "humantime_serde")]
    pub wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            wait: DEFAULT_RETRY_WAIT,
        }
    }
}

const fn default_retry_wait() -> Duration {
    DEFAULT_RETRY_WAIT
}

impl RetryPolicy {
    /// Retry at most `max_retries` times, starting with a pause of `wait`
    #[must_use]
    pub const fn new(max_retries: u64, wait: Duration) -> Self {
        Self { max_retries, wait }
    }

    /// Run `op` until it succeeds, fails permanently or the retries are
    /// used up. Only transient errors (timeouts, `429` and `5xx` responses)
    /// are retried.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries: u64 = 0;
        let mut wait = self.wait;

        let mut result = op().await;
        while retries < self.max_retries {
            match &result {
                Err(e) if e.should_retry() => debug!("Retrying in {wait:?}: {e}"),
                _ => return result,
            }
            sleep(wait).await;
            retries += 1;
            wait = wait.saturating_mul(2);
            result = op().await;
        }
        result
    }

    /// Run `op` again while `predicate` holds for its result, at most
    /// `max_retries` more times. `op` receives the number of the attempt,
    /// starting at zero, so it can change its strategy on a retry (e.g.
    /// skip the cache). The last result is returned in any case.
    pub async fn retry_while<T, F, Fut, P>(&self, mut op: F, mut predicate: P) -> T
    where
        F: FnMut(u64) -> Fut,
        Fut: Future<Output = T>,
        P: FnMut(&T) -> bool,
    {
        let mut attempt: u64 = 0;
        let mut wait = self.wait;

        let mut result = op(attempt).await;
        while predicate(&result) {
            if attempt >= self.max_retries {
                if self.max_retries > 0 {
                    warn!("Giving up after {attempt} retries");
                }
                break;
            }
            sleep(wait).await;
            attempt += 1;
            wait = wait.saturating_mul(2);
            result = op(attempt).await;
        }
        result
    }
}
