//! The boundary between the execution core and the wire.
//!
//! The core never speaks HTTP itself. It hands a method, URL, headers and an
//! optional body to a [`Transport`] and gets back a status code and the raw
//! response body. [`ReqwestTransport`] is the implementation used in
//! production; tests substitute their own.

use std::{error::Error, fmt::Debug, time::Duration};

use async_trait::async_trait;
use http::{HeaderMap, HeaderValue, StatusCode, header};
use url::Url;

use crate::{ErrorKind, Method, Payload, Result};

/// Total time a request may take, including reading the body
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Time allowed to establish a connection
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default user agent, `fastbio/<PKG_VERSION>`
pub const DEFAULT_USER_AGENT: &str = concat!("fastbio/", env!("CARGO_PKG_VERSION"));

const TCP_KEEPALIVE: Duration = Duration::from_secs(60);

/// Status code and body of a completed exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// Status code sent by the remote service
    pub status: StatusCode,
    /// Raw response body
    pub body: Payload,
}

impl TransportResponse {
    /// Create a response from its parts
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<Payload>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Something which can carry a single request to a remote service.
///
/// Implementations must be safe to share between all in-flight requests of
/// a batch; connection pooling is their business. Failures to obtain a
/// response at all are reported as [`ErrorKind::Connect`],
/// [`ErrorKind::Timeout`] or [`ErrorKind::NetworkRequest`]. Any status code,
/// including error codes, is an `Ok` response at this level.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Send one request and wait for the complete response
    async fn send(
        &self,
        method: Method,
        url: &Url,
        headers: &HeaderMap,
        body: Option<&[u8]>,
    ) -> Result<TransportResponse>;
}

/// [`Transport`] on top of a [`reqwest::Client`]
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Wrap an existing client
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Build a client with gzip support and the given user agent and timeouts.
    ///
    /// # Errors
    ///
    /// Returns an `Err` if the user agent is not a valid header value or if
    /// the client cannot be created.
    pub fn build(user_agent: &str, timeout: Duration, connect_timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_str(user_agent).map_err(ErrorKind::InvalidHeader)?,
        );

        let client = reqwest::ClientBuilder::new()
            .gzip(true)
            .default_headers(headers)
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .tcp_keepalive(TCP_KEEPALIVE)
            .build()
            .map_err(ErrorKind::BuildRequestClient)?;

        Ok(Self::new(client))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        method: Method,
        url: &Url,
        headers: &HeaderMap,
        body: Option<&[u8]>,
    ) -> Result<TransportResponse> {
        let mut request = self
            .client
            .request(method.into(), url.clone())
            .headers(headers.clone());
        if let Some(body) = body {
            request = request.body(body.to_vec());
        }

        let response = request.send().await.map_err(|e| classify(url, &e))?;
        let status = response.status();
        let body = response.bytes().await.map_err(|e| classify(url, &e))?;

        Ok(TransportResponse::new(status, body.to_vec()))
    }
}

/// Map a `reqwest` failure onto the error taxonomy.
/// Timeouts are checked first, as a connect timeout is both.
fn classify(url: &Url, error: &reqwest::Error) -> ErrorKind {
    if error.is_timeout() {
        ErrorKind::Timeout(url.clone())
    } else if error.is_connect() {
        ErrorKind::Connect(url.clone(), root_cause(error))
    } else {
        ErrorKind::NetworkRequest(url.clone(), root_cause(error))
    }
}

/// The innermost message of an error chain, which is usually the most
/// helpful one (e.g. "Connection refused" instead of "error sending request")
fn root_cause(error: &(dyn Error + 'static)) -> String {
    let mut cause = error;
    while let Some(source) = cause.source() {
        cause = source;
    }
    cause.to_string()
}
