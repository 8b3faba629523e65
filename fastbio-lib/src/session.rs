use std::{fmt, path::PathBuf, sync::Arc, time::Duration};

use log::{debug, warn};
use typed_builder::TypedBuilder;

use crate::{
    CacheStore, Result,
    ratelimit::RateLimiterPool,
    transport::{
        DEFAULT_CONNECT_TIMEOUT, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT, ReqwestTransport, Transport,
    },
};

/// Directory the cache lives in unless configured otherwise:
/// `fastbio` below the platform's cache directory, or below the
/// temporary directory if the platform has none.
#[must_use]
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("fastbio")
}

/// Builder for [`Session`].
///
/// ```
/// use fastbio_lib::SessionBuilder;
/// use std::time::Duration;
///
/// # fn main() -> fastbio_lib::Result<()> {
/// let dir = tempfile::tempdir().unwrap();
/// let session = SessionBuilder::builder()
///     .cache_dir(dir.path())
///     .timeout(Duration::from_secs(30))
///     .build()
///     .session()?;
/// assert!(session.cache().is_some());
/// # Ok(())
/// # }
/// ```
#[derive(TypedBuilder, Debug, Clone)]
#[builder(field_defaults(default, setter(into)))]
#[builder(builder_method(doc = "
Create a builder for building `SessionBuilder`.

On the builder call, call methods with same name as its fields to set their values.

Finally, call `.build()` to create the instance of `SessionBuilder`.
"))]
pub struct SessionBuilder {
    /// Directory of the on-disk response cache
    #[builder(default = default_cache_dir())]
    cache_dir: PathBuf,

    /// When `false`, no client of this session uses the cache, regardless
    /// of its own setting.
    #[builder(default = true)]
    cache_enabled: bool,

    /// Cached responses older than this are fetched again.
    /// By default cached responses never expire.
    max_cache_age: Option<Duration>,

    /// Total time a single request may take
    #[builder(default = DEFAULT_TIMEOUT)]
    timeout: Duration,

    /// Time allowed to establish a connection
    #[builder(default = DEFAULT_CONNECT_TIMEOUT)]
    connect_timeout: Duration,

    /// User agent sent with every request
    #[builder(default = String::from(DEFAULT_USER_AGENT))]
    user_agent: String,
}

impl Default for SessionBuilder {
    #[inline]
    fn default() -> Self {
        Self::builder().build()
    }
}

impl SessionBuilder {
    /// Instantiates a [`Session`].
    ///
    /// A cache directory which cannot be created is not an error: the
    /// session logs a warning and runs without cache.
    ///
    /// # Errors
    ///
    /// Returns an `Err` if:
    /// - The user agent is invalid.
    /// - The request client cannot be created.
    ///   See [here](https://docs.rs/reqwest/latest/reqwest/struct.ClientBuilder.html#errors).
    pub fn session(self) -> Result<Session> {
        let transport =
            ReqwestTransport::build(&self.user_agent, self.timeout, self.connect_timeout)?;

        let cache = if self.cache_enabled {
            match CacheStore::open(&self.cache_dir) {
                Ok(store) => {
                    debug!("Caching responses in {}", self.cache_dir.display());
                    Some(store.with_max_age(self.max_cache_age))
                }
                Err(e) => {
                    warn!("Caching disabled: {e}");
                    None
                }
            }
        } else {
            None
        };

        Ok(Session::with_transport(Arc::new(transport), cache))
    }
}

/// Resources shared by all clients of a process (or of one test).
///
/// A session owns the transport and its connection pool, the on-disk cache
/// and one rate limiter per service. It is cheap to clone; all clones refer
/// to the same resources, which are released when the last clone is
/// dropped. Clients keep their session alive.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    cache: Option<CacheStore>,
    limiters: RateLimiterPool,
}

impl Session {
    /// Create a session on top of any [`Transport`]
    #[must_use]
    pub fn with_transport(transport: Arc<dyn Transport>, cache: Option<CacheStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                cache,
                limiters: RateLimiterPool::new(),
            }),
        }
    }

    /// The transport all requests are sent through
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    /// The response cache, if caching is enabled
    #[must_use]
    pub fn cache(&self) -> Option<&CacheStore> {
        self.inner.cache.as_ref()
    }

    /// The rate limiters of all services used so far
    #[must_use]
    pub fn limiters(&self) -> &RateLimiterPool {
        &self.inner.limiters
    }

    /// Delete all cached responses.
    /// Returns the number of deleted entries.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ErrorKind::CacheIo`] if an entry cannot be removed.
    pub fn clear_cache(&self) -> Result<usize> {
        self.cache().map_or(Ok(0), CacheStore::clear)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("transport", &self.inner.transport)
            .field("cache", &self.inner.cache.as_ref().map(CacheStore::root))
            .field("services", &self.inner.limiters.len())
            .finish()
    }
}
