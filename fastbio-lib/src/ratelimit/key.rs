use std::fmt;
use url::Url;

use crate::{ErrorKind, Result};

/// Identifies a remote service for rate limiting purposes.
///
/// Every facade instance with the same key shares one limiter, so two
/// clients for the same service cannot exceed its limit together.
///
/// # Examples
///
/// ```
/// use fastbio_lib::ratelimit::ServiceKey;
/// use url::Url;
///
/// let url = Url::parse("https://REST.ensembl.org/info/species").unwrap();
/// let key = ServiceKey::try_from(&url).unwrap();
/// assert_eq!(key.as_str(), "rest.ensembl.org");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey(String);

impl ServiceKey {
    /// Get the service name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&Url> for ServiceKey {
    type Error = ErrorKind;

    fn try_from(url: &Url) -> Result<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| ErrorKind::InvalidUrlHost(url.clone()))?;

        // Normalize to lowercase for consistent lookup
        Ok(ServiceKey(host.to_lowercase()))
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServiceKey {
    fn from(name: &str) -> Self {
        ServiceKey(name.to_lowercase())
    }
}

impl From<String> for ServiceKey {
    fn from(name: String) -> Self {
        ServiceKey::from(name.as_str())
    }
}
