use std::path::PathBuf;

use http::StatusCode;
use thiserror::Error;
use url::Url;

use crate::PartialFailure;

/// Possible errors when interacting with `fastbio_lib`
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The transport could not establish a connection to the remote service
    #[error("Cannot connect to `{0}`: {1}")]
    Connect(Url, String),

    /// The request exceeded the transport deadline
    #[error("Request to `{0}` timed out")]
    Timeout(Url),

    /// The remote service answered with a status code other than 2xx or 404.
    /// The response body is kept for diagnostics.
    #[error("Rejected status code ({status}) from `{url}`")]
    RejectedStatusCode {
        /// The URL that was requested
        url: Url,
        /// Status code returned by the remote service
        status: StatusCode,
        /// Raw response body
        body: Vec<u8>,
    },

    /// Any other transport failure, e.g. while reading the response body
    #[error("Network error while requesting `{0}`: {1}")]
    NetworkRequest(Url, String),

    /// Reading or writing the on-disk cache failed.
    ///
    /// This never leaves the crate through a facade call: the cache is
    /// best-effort and such errors are logged and swallowed.
    #[error("Cache I/O error at `{}`: {}", .0.display(), .1)]
    CacheIo(PathBuf, #[source] std::io::Error),

    /// The configured number of requests per period was zero
    #[error("Invalid rate limit: at least one request per period must be allowed")]
    InvalidRateLimit,

    /// The configured rate limiting period was zero
    #[error("Invalid rate limit period: the period must be longer than zero")]
    InvalidPeriod,

    /// The configured concurrency cap was zero
    #[error("Invalid concurrency: at least one request must be allowed in flight")]
    InvalidConcurrency,

    /// A facade call was made without any request
    #[error("Cannot dispatch an empty batch of requests")]
    EmptyBatch,

    /// The given string cannot be parsed into a valid URL
    #[error("Cannot parse `{0}` as a URL: {1}")]
    InvalidUrl(String, #[source] url::ParseError),

    /// The given URL has no host, so no service can be derived from it
    #[error("URL `{0}` is missing a host")]
    InvalidUrlHost(Url),

    /// The given header value could not be parsed
    #[error("Header value could not be parsed")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),

    /// The given header name could not be parsed
    #[error("Header name could not be parsed")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// The request validator refused a request before dispatch
    #[error("Request to `{0}` was rejected before dispatch: {1}")]
    RejectedRequest(Url, String),

    /// The underlying HTTP client could not be created
    #[error("Error creating request client: {0}")]
    BuildRequestClient(#[source] reqwest::Error),

    /// The batch was cancelled before this request completed
    #[error("Request was cancelled before it completed")]
    Cancelled,

    /// Some requests of a batch failed. All outcomes, including the
    /// successful payloads, are carried along.
    #[error("{0}")]
    PartialFailure(Box<PartialFailure>),
}

impl ErrorKind {
    /// Returns `true` for errors which are raised before any request is
    /// dispatched, i.e. invalid configuration or malformed input.
    #[must_use]
    pub const fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRateLimit
                | Self::InvalidPeriod
                | Self::InvalidConcurrency
                | Self::EmptyBatch
                | Self::InvalidUrl(..)
                | Self::InvalidUrlHost(_)
                | Self::InvalidHeader(_)
                | Self::InvalidHeaderName(_)
                | Self::RejectedRequest(..)
                | Self::BuildRequestClient(_)
        )
    }

    /// Returns `true` for errors raised while talking to the remote service.
    #[must_use]
    pub const fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::Connect(..)
                | Self::Timeout(_)
                | Self::RejectedStatusCode { .. }
                | Self::NetworkRequest(..)
        )
    }

    /// The HTTP status code of a rejected response, if any
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::RejectedStatusCode { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The URL of the request that caused this error, if it is known
    #[must_use]
    pub const fn url(&self) -> Option<&Url> {
        match self {
            Self::Connect(url, _)
            | Self::Timeout(url)
            | Self::NetworkRequest(url, _)
            | Self::RejectedRequest(url, _)
            | Self::InvalidUrlHost(url)
            | Self::RejectedStatusCode { url, .. } => Some(url),
            _ => None,
        }
    }

    /// The partial batch result carried by this error, if any
    #[must_use]
    pub fn partial_failure(&self) -> Option<&PartialFailure> {
        match self {
            Self::PartialFailure(partial) => Some(&**partial),
            _ => None,
        }
    }
}
