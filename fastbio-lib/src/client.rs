//! The public entry point: one [`ServiceClient`] per remote service.
//!
//! A client is built from a [`ClientBuilder`] and a [`Session`], which
//! provides the transport, the cache and the rate limiter of the service.
//! All methods take `&self`, so one client can run many batches at the same
//! time; they share its rate limit.
use std::{fmt, sync::Arc, time::Duration};

use http::{
    HeaderMap,
    header::{HeaderName, HeaderValue},
};
use tokio_util::sync::CancellationToken;
use typed_builder::TypedBuilder;
use url::Url;

use crate::{
    BatchResponse, ErrorKind, LogicalRequest, Method, Payload, Result, Session,
    dispatcher::Dispatcher,
    executor::{BatchExecutor, DEFAULT_MAX_CONCURRENCY},
    helpers::url::resolve,
    ratelimit::{DEFAULT_PERIOD, DEFAULT_REQUESTS_PER_SECOND, RateLimitConfig, ServiceKey},
    retry::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_WAIT, RetryPolicy},
    stats::DispatchStats,
};

/// Rate limiter shared by clients with neither a service name nor a base URL
const DEFAULT_SERVICE: &str = "default";

/// Check run on every request before a batch is dispatched.
///
/// This is the place for domain rules such as "the taxon must be known to
/// the service". A refusal aborts the whole call before any request is sent.
///
/// ```
/// use fastbio_lib::RequestValidator;
///
/// let validator = RequestValidator::new(|request| {
///     if request.url().query().is_some_and(|q| q.contains("taxon=")) {
///         Ok(())
///     } else {
///         Err("missing taxon".to_string())
///     }
/// });
/// ```
#[derive(Clone)]
pub struct RequestValidator(
    Arc<dyn Fn(&LogicalRequest) -> std::result::Result<(), String> + Send + Sync>,
);

impl RequestValidator {
    /// Wrap a function returning the reason for refusing a request
    pub fn new<F>(validate: F) -> Self
    where
        F: Fn(&LogicalRequest) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        Self(Arc::new(validate))
    }

    /// Check a single request.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::RejectedRequest`] if the request is refused.
    pub fn validate(&self, request: &LogicalRequest) -> Result<()> {
        (self.0)(request).map_err(|reason| ErrorKind::RejectedRequest(request.url().clone(), reason))
    }
}

impl fmt::Debug for RequestValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RequestValidator")
    }
}

/// Per-call settings for the requests of one batch
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Headers added to every request, replacing client defaults of the same name
    pub headers: HeaderMap,
    /// Skip the cache: always fetch from the network and do not write back
    pub cache_bypass: bool,
}

impl RequestOptions {
    /// Options without extra headers, using the cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header to every request
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Skip the cache for every request
    #[must_use]
    pub const fn bypass_cache(mut self, cache_bypass: bool) -> Self {
        self.cache_bypass = cache_bypass;
        self
    }
}

/// Builder for [`ServiceClient`].
///
/// ```
/// use fastbio_lib::{ClientBuilder, SessionBuilder};
///
/// # fn main() -> fastbio_lib::Result<()> {
/// let dir = tempfile::tempdir().unwrap();
/// let session = SessionBuilder::builder().cache_dir(dir.path()).build().session()?;
/// let client = ClientBuilder::builder()
///     .base_url("https://mygene.info/v3")
///     .requests_per_second(10u32)
///     .build()
///     .client(&session)?;
/// assert_eq!(client.service().as_str(), "mygene.info");
/// # Ok(())
/// # }
/// ```
#[derive(TypedBuilder, Debug, Clone)]
#[builder(field_defaults(default, setter(into)))]
#[builder(builder_method(doc = "
Create a builder for building `ClientBuilder`.

On the builder call, call methods with same name as its fields to set their values.

Finally, call `.build()` to create the instance of `ClientBuilder`.
"))]
pub struct ClientBuilder {
    /// Name of the service, used to share its rate limit between clients.
    ///
    /// Defaults to the host of [`ClientBuilder::base_url`].
    service: String,

    /// Prefix of all relative URLs passed to the client.
    /// Absolute URLs are used as they are.
    base_url: String,

    /// Maximum number of network requests per [`ClientBuilder::period`].
    /// Must be at least one. Cache hits do not count.
    #[builder(default = DEFAULT_REQUESTS_PER_SECOND)]
    requests_per_second: u32,

    /// Length of the rate limiting window
    #[builder(default = DEFAULT_PERIOD)]
    period: Duration,

    /// Read responses from and write them to the session cache
    #[builder(default = true)]
    cache_enabled: bool,

    /// Maximum number of requests in flight at the same time
    #[builder(default = DEFAULT_MAX_CONCURRENCY)]
    max_concurrency: usize,

    /// Headers sent with every request of this client
    headers: HeaderMap,

    /// Retries of a request after a timeout, `429` or `5xx`
    #[builder(default = DEFAULT_MAX_RETRIES)]
    max_retries: u64,

    /// Wait before the first retry, doubled for every further one
    #[builder(default = DEFAULT_RETRY_WAIT)]
    retry_wait: Duration,

    /// Check run on every request before dispatch
    validator: Option<RequestValidator>,
}

impl Default for ClientBuilder {
    #[inline]
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ClientBuilder {
    /// Instantiates a [`ServiceClient`] using the resources of `session`.
    ///
    /// # Errors
    ///
    /// Returns an `Err` if:
    /// - `requests_per_second`, `period` or `max_concurrency` is zero.
    /// - The base URL is not a valid URL.
    pub fn client(self, session: &Session) -> Result<ServiceClient> {
        let rate_limit = RateLimitConfig::new(self.requests_per_second, self.period);
        rate_limit.validate()?;

        let base = if self.base_url.is_empty() {
            None
        } else {
            let base = Url::parse(&self.base_url)
                .map_err(|e| ErrorKind::InvalidUrl(self.base_url.clone(), e))?;
            Some(base)
        };

        let service = if !self.service.is_empty() {
            ServiceKey::from(self.service.as_str())
        } else if let Some(base) = &base {
            ServiceKey::try_from(base)?
        } else {
            ServiceKey::from(DEFAULT_SERVICE)
        };

        let limiter = session.limiters().get_or_create(service, &rate_limit)?;
        let cache = session.cache().filter(|_| self.cache_enabled).cloned();
        let dispatcher = Dispatcher::new(Arc::clone(session.transport()), cache, limiter);
        let executor = BatchExecutor::new(dispatcher, self.max_concurrency)?
            .with_retry_policy(RetryPolicy::new(self.max_retries, self.retry_wait));

        Ok(ServiceClient {
            base_url: self.base_url,
            headers: self.headers,
            validator: self.validator,
            executor,
            _session: session.clone(),
        })
    }
}

/// Facade for the requests to one remote service.
///
/// `get` and `post` return the payloads in the order of the given URLs or
/// bodies. If some requests fail, they return
/// [`ErrorKind::PartialFailure`], which still carries every payload which
/// did arrive and tells which requests failed. Invalid input is rejected
/// before any request is sent.
///
/// See [`ClientBuilder`] for the configuration options.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    base_url: String,
    headers: HeaderMap,
    validator: Option<RequestValidator>,
    executor: BatchExecutor,
    /// Keeps the shared resources alive as long as the client
    _session: Session,
}

impl ServiceClient {
    /// Fetch all `urls`, relative ones are appended to the base URL.
    ///
    /// # Errors
    ///
    /// See [`ServiceClient::get_with`].
    pub async fn get<I, S>(&self, urls: I) -> Result<Vec<Payload>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.get_with(urls, &RequestOptions::default()).await
    }

    /// Fetch a single URL.
    ///
    /// # Errors
    ///
    /// Returns the error of the request itself, or a configuration error.
    pub async fn get_one(&self, url: &str) -> Result<Payload> {
        let request = self.request(Method::Get, url, None, &RequestOptions::default())?;
        self.execute(vec![request])
            .await?
            .into_outcomes()
            .pop()
            .map_or(Err(ErrorKind::EmptyBatch), |outcome| outcome.result)
    }

    /// Fetch all `urls` with extra headers or without cache.
    ///
    /// # Errors
    ///
    /// Returns an `Err` if:
    /// - `urls` is empty, a URL is invalid or a request is refused by the
    ///   validator. No request is sent in this case.
    /// - At least one request failed ([`ErrorKind::PartialFailure`]).
    pub async fn get_with<I, S>(&self, urls: I, options: &RequestOptions) -> Result<Vec<Payload>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let requests = urls
            .into_iter()
            .map(|url| self.request(Method::Get, url.as_ref(), None, options))
            .collect::<Result<Vec<_>>>()?;
        self.execute(requests).await?.into_payloads()
    }

    /// Send each of `bodies` to `url`.
    ///
    /// # Errors
    ///
    /// See [`ServiceClient::post_with`].
    pub async fn post<I, B>(&self, url: &str, bodies: I) -> Result<Vec<Payload>>
    where
        I: IntoIterator<Item = B>,
        B: Into<Vec<u8>>,
    {
        self.post_with(url, bodies, &RequestOptions::default())
            .await
    }

    /// Send each of `bodies` to `url` with extra headers or without cache.
    ///
    /// # Errors
    ///
    /// Returns an `Err` if:
    /// - `bodies` is empty, `url` is invalid or a request is refused by the
    ///   validator. No request is sent in this case.
    /// - At least one request failed ([`ErrorKind::PartialFailure`]).
    pub async fn post_with<I, B>(
        &self,
        url: &str,
        bodies: I,
        options: &RequestOptions,
    ) -> Result<Vec<Payload>>
    where
        I: IntoIterator<Item = B>,
        B: Into<Vec<u8>>,
    {
        let requests = bodies
            .into_iter()
            .map(|body| self.request(Method::Post, url, Some(body.into()), options))
            .collect::<Result<Vec<_>>>()?;
        self.execute(requests).await?.into_payloads()
    }

    /// Build the request the client would send for `url`: the URL is
    /// resolved against the base URL and made safe, and the client's and
    /// the call's headers are added.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidUrl`] if `url` cannot be resolved.
    pub fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<Vec<u8>>,
        options: &RequestOptions,
    ) -> Result<LogicalRequest> {
        let url = resolve(&self.base_url, url)?;
        let request = match method {
            Method::Get => LogicalRequest::get(url),
            Method::Post => LogicalRequest::post(url, body.unwrap_or_default()),
        };
        Ok(request
            .with_headers(&self.headers)
            .with_headers(&options.headers)
            .bypass_cache(options.cache_bypass))
    }

    /// Run prepared requests and return the outcome of each one.
    ///
    /// Unlike `get` and `post`, failed requests are not turned into an
    /// error, inspect the [`BatchResponse`] instead.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `requests` is empty or a request is
    /// refused by the validator.
    pub async fn execute(&self, requests: Vec<LogicalRequest>) -> Result<BatchResponse> {
        self.check(&requests)?;
        Ok(self.executor.run(requests).await)
    }

    /// Like [`ServiceClient::execute`], but stops when `token` is cancelled.
    /// Requests which did not finish by then fail with [`ErrorKind::Cancelled`].
    ///
    /// # Errors
    ///
    /// See [`ServiceClient::execute`].
    pub async fn execute_with_cancellation(
        &self,
        requests: Vec<LogicalRequest>,
        token: CancellationToken,
    ) -> Result<BatchResponse> {
        self.check(&requests)?;
        Ok(self.executor.run_with_cancellation(requests, token).await)
    }

    fn check(&self, requests: &[LogicalRequest]) -> Result<()> {
        if requests.is_empty() {
            return Err(ErrorKind::EmptyBatch);
        }
        if let Some(validator) = &self.validator {
            for request in requests {
                validator.validate(request)?;
            }
        }
        Ok(())
    }

    /// Counters of all requests run by this client and its clones
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        self.executor.dispatcher().stats()
    }

    /// The service whose rate limit this client draws from
    #[must_use]
    pub fn service(&self) -> &ServiceKey {
        self.executor.dispatcher().limiter().key()
    }

    /// Prefix of relative URLs
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether responses are cached
    #[must_use]
    pub const fn cache_enabled(&self) -> bool {
        self.executor.dispatcher().cache_enabled()
    }
}
