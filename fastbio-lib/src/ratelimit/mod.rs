//! Per-service rate limiting.
//!
//! Rate limiting only governs live network calls: responses served from the
//! cache never pass through a limiter.
//!
//! # Architecture
//!
//! - [`ServiceKey`]: Identifies a remote service (its name or host)
//! - [`RateLimitConfig`]: Requests per period for one service
//! - [`RateLimiter`]: Sliding window admission gate for one service
//! - [`RateLimiterPool`]: Shares one limiter per service across clients

mod config;
mod key;
mod limiter;
mod pool;
mod window;

pub use config::{DEFAULT_PERIOD, DEFAULT_REQUESTS_PER_SECOND, RateLimitConfig};
pub use key::ServiceKey;
pub use limiter::RateLimiter;
pub use pool::RateLimiterPool;
