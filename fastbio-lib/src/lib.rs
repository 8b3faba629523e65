//! `fastbio` runs batches of requests against the REST APIs of biological
//! databases: fast, but without overloading the services.
//!
//! Every request of a batch goes through the same steps. A persistent
//! on-disk cache answers repeated requests without touching the network.
//! Requests which do go out are admitted by a per-service rate limiter and
//! run concurrently up to a configurable cap. Results come back in the
//! order of the request list, and a failing request never takes its
//! siblings down with it.
//!
//! ```no_run
//! use fastbio_lib::{ClientBuilder, Result, SessionBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let session = SessionBuilder::default().session()?;
//!     let client = ClientBuilder::builder()
//!         .base_url("https://rest.ensembl.org")
//!         .requests_per_second(15u32)
//!         .build()
//!         .client(&session)?;
//!
//!     let payloads = client
//!         .get(["/lookup/id/ENSG00000157764?content-type=application/json"])
//!         .await?;
//!     println!("{}", String::from_utf8_lossy(&payloads[0]));
//!     Ok(())
//! }
//! ```
//!
//! Lower level building blocks, such as the [`Dispatcher`] and the
//! [`BatchExecutor`], are exported as well for callers who bring their own
//! [`Transport`] or want to inspect every single [`Outcome`].

mod cache;
mod client;
mod dispatcher;
mod executor;
mod progress;
mod retry;
mod session;
mod stats;
mod types;

pub mod helpers;
pub mod ratelimit;
pub mod transport;

#[cfg(test)]
mod test_utils;

pub use crate::{
    cache::{CacheEntry, CacheKey, CacheStore},
    client::{ClientBuilder, RequestOptions, RequestValidator, ServiceClient},
    dispatcher::{Dispatcher, Source},
    executor::{BatchExecutor, DEFAULT_MAX_CONCURRENCY},
    retry::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_WAIT, RetryPolicy},
    session::{Session, SessionBuilder, default_cache_dir},
    stats::DispatchStats,
    transport::{ReqwestTransport, Transport, TransportResponse},
    types::*,
};
