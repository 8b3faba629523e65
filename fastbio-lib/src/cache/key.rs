use std::fmt;

use http::HeaderMap;
use sha2::{Digest, Sha256};
use url::Url;

use crate::{LogicalRequest, Method};

/// Content address of a cached response.
///
/// The key is the hex-encoded SHA-256 digest of the method, the URL, the
/// request headers (lower-cased names, sorted, so insertion order does not
/// matter) and the length-prefixed body.
///
/// # Examples
///
/// ```
/// use fastbio_lib::{CacheKey, Method};
/// use http::HeaderMap;
/// use url::Url;
///
/// let url = Url::parse("https://x/y").unwrap();
/// let key = CacheKey::new(Method::Get, &url, &HeaderMap::new(), None);
/// assert_eq!(key, CacheKey::new(Method::Get, &url, &HeaderMap::new(), None));
/// assert_eq!(key.as_str().len(), 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for the given request parts
    #[must_use]
    pub fn new(method: Method, url: &Url, headers: &HeaderMap, body: Option<&[u8]>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(method.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(url.as_str().as_bytes());
        hasher.update(b"\n");

        let mut pairs: Vec<(&str, &[u8])> = headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_bytes()))
            .collect();
        pairs.sort_unstable();
        for (name, value) in pairs {
            hasher.update(name.as_bytes());
            hasher.update(b":");
            hasher.update(value);
            hasher.update(b"\n");
        }

        // An absent body and an empty body are different requests
        match body {
            Some(body) => {
                hasher.update(b"body:");
                hasher.update((body.len() as u64).to_le_bytes());
                hasher.update(body);
            }
            None => hasher.update(b"nobody"),
        }

        Self(format!("{:x}", hasher.finalize()))
    }

    /// The hex digest
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split the digest into the shard directory name and the file name
    pub(crate) fn shard(&self) -> (&str, &str) {
        self.0.split_at(2)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&LogicalRequest> for CacheKey {
    fn from(request: &LogicalRequest) -> Self {
        request.cache_key()
    }
}
