use std::{convert::TryFrom, fmt::Display};

use http::{
    HeaderMap,
    header::{HeaderName, HeaderValue},
};
use url::Url;

use crate::{CacheKey, ErrorKind, Method};

/// A single logical query against a remote service.
///
/// Requests are immutable once built: the builder-style methods consume the
/// request and return a new one. A request is handed to the batch executor
/// exactly once and dropped after its result has been delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalRequest {
    method: Method,
    url: Url,
    body: Option<Vec<u8>>,
    headers: HeaderMap,
    cache_bypass: bool,
}

impl LogicalRequest {
    /// Create a `GET` request for the given URL
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::Get,
            url,
            body: None,
            headers: HeaderMap::new(),
            cache_bypass: false,
        }
    }

    /// Create a `POST` request sending `body` to the given URL
    #[must_use]
    pub fn post(url: Url, body: impl Into<Vec<u8>>) -> Self {
        Self {
            method: Method::Post,
            url,
            body: Some(body.into()),
            headers: HeaderMap::new(),
            cache_bypass: false,
        }
    }

    /// Add a single header, replacing any previous value with the same name
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Add all given headers, replacing previous values with the same names
    #[must_use]
    pub fn with_headers(mut self, headers: &HeaderMap) -> Self {
        for (name, value) in headers {
            self.headers.insert(name.clone(), value.clone());
        }
        self
    }

    /// Skip the cache for this request: the response is always fetched
    /// from the network and not written back.
    #[must_use]
    pub const fn bypass_cache(mut self, cache_bypass: bool) -> Self {
        self.cache_bypass = cache_bypass;
        self
    }

    /// The HTTP method of this request
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// The (already encoded) URL of this request
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// The request body, only present for `POST` requests
    #[must_use]
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Request specific headers
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Whether this request skips the cache
    #[must_use]
    pub const fn cache_bypass(&self) -> bool {
        self.cache_bypass
    }

    /// The key under which the response to this request is cached
    #[must_use]
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(self.method, &self.url, &self.headers, self.body())
    }
}

impl Display for LogicalRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

impl TryFrom<&str> for LogicalRequest {
    type Error = ErrorKind;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let url = Url::parse(s).map_err(|e| ErrorKind::InvalidUrl(s.to_owned(), e))?;
        Ok(LogicalRequest::get(url))
    }
}

impl TryFrom<String> for LogicalRequest {
    type Error = ErrorKind;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        LogicalRequest::try_from(s.as_str())
    }
}

impl From<Url> for LogicalRequest {
    fn from(url: Url) -> Self {
        LogicalRequest::get(url)
    }
}
