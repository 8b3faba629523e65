use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use http::{HeaderMap, StatusCode};
use url::Url;

use crate::{
    ErrorKind, Method, Result,
    transport::{Transport, TransportResponse},
};

/// How the [`MockTransport`] answers requests to one path
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    /// `200 OK` with the request body, or the URL for requests without body
    Echo,
    /// The given status and body
    Status(StatusCode, Vec<u8>),
    /// The first `failures` requests get `status`, later ones are echoed
    Flaky { failures: usize, status: StatusCode },
    /// The connection cannot be established
    ConnectError,
    /// The transport deadline passes
    Timeout,
}

impl Reply {
    pub(crate) const fn status(status: StatusCode) -> Self {
        Self::Status(status, Vec::new())
    }
}

/// In-memory [`Transport`] which counts calls and the highest number of
/// concurrent calls it has seen.
#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    replies: HashMap<String, Reply>,
    delays: HashMap<String, Duration>,
    default_delay: Duration,
    calls: AtomicUsize,
    calls_per_path: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Answer requests to `path` with `reply`
    pub(crate) fn reply(mut self, path: &str, reply: Reply) -> Self {
        self.replies.insert(path.to_string(), reply);
        self
    }

    /// Delay answers to `path`
    pub(crate) fn delay(mut self, path: &str, delay: Duration) -> Self {
        self.delays.insert(path.to_string(), delay);
        self
    }

    /// Delay answers to paths without their own delay
    pub(crate) const fn default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Total number of requests received
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of requests received for `path`
    pub(crate) fn calls_to(&self, path: &str) -> usize {
        self.calls_per_path
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    /// Highest number of requests in flight at the same time
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight counter even if the request future is dropped
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        _method: Method,
        url: &Url,
        _headers: &HeaderMap,
        body: Option<&[u8]>,
    ) -> Result<TransportResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let path = url.path().to_string();
        let call = {
            let mut per_path = self.calls_per_path.lock().unwrap();
            let count = per_path.entry(path.clone()).or_insert(0);
            *count += 1;
            *count
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let delay = self.delays.get(&path).copied().unwrap_or(self.default_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let echo = || {
            let body = body.map_or_else(|| url.as_str().as_bytes().to_vec(), <[u8]>::to_vec);
            Ok(TransportResponse::new(StatusCode::OK, body))
        };

        match self.replies.get(&path).cloned().unwrap_or(Reply::Echo) {
            Reply::Echo => echo(),
            Reply::Status(status, body) => Ok(TransportResponse::new(status, body)),
            Reply::Flaky { failures, status } if call <= failures => {
                Ok(TransportResponse::new(status, Vec::new()))
            }
            Reply::Flaky { .. } => echo(),
            Reply::ConnectError => Err(ErrorKind::Connect(
                url.clone(),
                "Connection refused".to_string(),
            )),
            Reply::Timeout => Err(ErrorKind::Timeout(url.clone())),
        }
    }
}
