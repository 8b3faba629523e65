use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{ErrorKind, Result};

/// Default number of network requests per period
pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 5;

/// Default length of the rate limiting window
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(1);

/// Throughput limit of a single service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Maximum number of network requests within one period
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Length of the sliding window the limit applies to
    #[serde(default = "default_period", with = "humantime_serde")]
    pub period: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            period: default_period(),
        }
    }
}

/// Default number of network requests per period
const fn default_requests_per_second() -> u32 {
    DEFAULT_REQUESTS_PER_SECOND
}

/// Default length of the rate limiting window
const fn default_period() -> Duration {
    DEFAULT_PERIOD
}

impl RateLimitConfig {
    /// Create a new config allowing `requests_per_second` requests per `period`
    #[must_use]
    pub const fn new(requests_per_second: u32, period: Duration) -> Self {
        Self {
            requests_per_second,
            period,
        }
    }

    /// Create a `RateLimitConfig` from CLI options, using defaults for missing values
    #[must_use]
    pub fn from_options(requests_per_second: Option<u32>, period: Option<Duration>) -> Self {
        Self {
            requests_per_second: requests_per_second.unwrap_or(DEFAULT_REQUESTS_PER_SECOND),
            period: period.unwrap_or(DEFAULT_PERIOD),
        }
    }

    /// Reject limits which would never admit a request.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidRateLimit`] if no request is allowed per
    /// period and [`ErrorKind::InvalidPeriod`] if the period is zero.
    pub fn validate(&self) -> Result<()> {
        if self.requests_per_second == 0 {
            return Err(ErrorKind::InvalidRateLimit);
        }
        if self.period.is_zero() {
            return Err(ErrorKind::InvalidPeriod);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rate_limit_config() {
        let config = RateLimitConfig::default();
        assert_eq!(config.requests_per_second, 5);
        assert_eq!(config.period, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_options() {
        let config = RateLimitConfig::from_options(Some(15), None);
        assert_eq!(config, RateLimitConfig::new(15, Duration::from_secs(1)));
    }

    #[test]
    fn test_validate() {
        assert!(matches!(
            RateLimitConfig::new(0, Duration::from_secs(1)).validate(),
            Err(ErrorKind::InvalidRateLimit)
        ));
        assert!(matches!(
            RateLimitConfig::new(3, Duration::ZERO).validate(),
            Err(ErrorKind::InvalidPeriod)
        ));
    }

    #[test]
    fn test_config_from_toml() {
        let config: RateLimitConfig = toml::from_str(
            r#"
            requests_per_second = 15
            period = "2s"
            "#,
        )
        .unwrap();
        assert_eq!(config, RateLimitConfig::new(15, Duration::from_secs(2)));

        let config: RateLimitConfig = toml::from_str("").unwrap();
        assert_eq!(config, RateLimitConfig::default());

        assert!(toml::from_str::<RateLimitConfig>("burst = 3").is_err());
    }
}
