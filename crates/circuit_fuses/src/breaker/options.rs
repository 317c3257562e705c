// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use super::constants::{DEFAULT_MAX_FAILURES, DEFAULT_RESET_TIMEOUT, DEFAULT_TIMEOUT};

/// Thresholds and timings of a [`CircuitBreaker`][super::CircuitBreaker].
///
/// | Option | Default | Effect |
/// |---|---|---|
/// | [`timeout`][Self::timeout] | 10 s | per-call deadline |
/// | [`max_failures`][Self::max_failures] | 5 | qualifying failures in a row before the breaker trips |
/// | [`reset_timeout`][Self::reset_timeout] | 50 ms | how long the breaker stays open before admitting a probe |
///
/// With the `serde` feature the options (de)serialize using the keys `timeout`, `maxFailures` and
/// `resetTimeout`, durations expressed in milliseconds. Missing keys take their defaults.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use circuit_fuses::BreakerOptions;
///
/// let options = BreakerOptions::default()
///     .timeout(Duration::from_secs(2))
///     .max_failures(3);
///
/// assert_eq!(options.get_max_failures(), 3);
/// assert_eq!(options.get_reset_timeout(), Duration::from_millis(50));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct BreakerOptions {
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_millis"))]
    timeout: Duration,
    max_failures: u32,
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_millis"))]
    reset_timeout: Duration,
}

impl Default for BreakerOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_failures: DEFAULT_MAX_FAILURES,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
        }
    }
}

impl BreakerOptions {
    /// Sets the deadline for a single command call.
    ///
    /// A call that does not complete in time fails with
    /// [`BreakerError::Timeout`][crate::BreakerError::Timeout] and counts as a qualifying failure.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets how many qualifying failures in a row trip the breaker.
    ///
    /// A value of `0` behaves like `1`: the first qualifying failure trips the breaker.
    #[must_use]
    pub fn max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = max_failures;
        self
    }

    /// Sets how long the breaker stays open before the next call is admitted as a probe.
    #[must_use]
    pub fn reset_timeout(mut self, reset_timeout: Duration) -> Self {
        self.reset_timeout = reset_timeout;
        self
    }

    /// Returns the per-call deadline.
    #[must_use]
    pub fn get_timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the trip threshold.
    #[must_use]
    pub fn get_max_failures(&self) -> u32 {
        self.max_failures
    }

    /// Returns the open duration before a probe is admitted.
    #[must_use]
    pub fn get_reset_timeout(&self) -> Duration {
        self.reset_timeout
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = BreakerOptions::default();

        assert_eq!(options.get_timeout(), Duration::from_secs(10));
        assert_eq!(options.get_max_failures(), 5);
        assert_eq!(options.get_reset_timeout(), Duration::from_millis(50));
    }

    #[test]
    fn overrides_keep_other_defaults() {
        let options = BreakerOptions::default().timeout(Duration::from_millis(432));

        assert_eq!(options.get_timeout(), Duration::from_millis(432));
        assert_eq!(options.get_max_failures(), 5);
        assert_eq!(options.get_reset_timeout(), Duration::from_millis(50));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserialize_uses_camel_case_keys_and_defaults() {
        let options: BreakerOptions = serde_json::from_str(r#"{ "timeout": 432, "maxFailures": 2 }"#).unwrap();

        assert_eq!(
            options,
            BreakerOptions::default()
                .timeout(Duration::from_millis(432))
                .max_failures(2)
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serialize_writes_milliseconds() {
        let json = serde_json::to_value(BreakerOptions::default()).unwrap();

        assert_eq!(json, serde_json::json!({ "timeout": 10_000, "maxFailures": 5, "resetTimeout": 50 }));
    }
}
