// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use super::constants::{DEFAULT_FACTOR, DEFAULT_MAX_TIMEOUT, DEFAULT_MIN_TIMEOUT, DEFAULT_RANDOMIZE, DEFAULT_RETRIES};

/// How often and how patiently a [`RetryController`][super::RetryController] retries.
///
/// The delay before retry `n` (counting from zero) is `min_timeout * factor^n`, multiplied by a
/// random value in `[1, 2)` when `randomize` is set, and capped at `max_timeout`.
///
/// | Option | Default |
/// |---|---|
/// | [`retries`][Self::retries] | 5 |
/// | [`factor`][Self::factor] | 2 |
/// | [`min_timeout`][Self::min_timeout] | 1 s |
/// | [`max_timeout`][Self::max_timeout] | uncapped |
/// | [`randomize`][Self::randomize] | `false` |
///
/// With the `serde` feature the options use the keys `retries`, `factor`, `minTimeout`,
/// `maxTimeout` and `randomize`, durations in milliseconds.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use circuit_fuses::RetryOptions;
///
/// let options = RetryOptions::default()
///     .retries(3)
///     .min_timeout(Duration::from_millis(100))
///     .max_timeout(Duration::from_secs(1));
///
/// assert_eq!(options.get_retries(), 3);
/// assert_eq!(options.get_factor(), 2.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct RetryOptions {
    retries: u32,
    factor: f64,
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_millis"))]
    min_timeout: Duration,
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_millis::option"))]
    max_timeout: Option<Duration>,
    randomize: bool,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            factor: DEFAULT_FACTOR,
            min_timeout: DEFAULT_MIN_TIMEOUT,
            max_timeout: DEFAULT_MAX_TIMEOUT,
            randomize: DEFAULT_RANDOMIZE,
        }
    }
}

impl RetryOptions {
    /// Sets the maximum number of retries after the first attempt.
    ///
    /// `0` disables retrying; the command is attempted once.
    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the growth factor of the backoff delay.
    #[must_use]
    pub fn factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    /// Sets the delay before the first retry.
    #[must_use]
    pub fn min_timeout(mut self, min_timeout: Duration) -> Self {
        self.min_timeout = min_timeout;
        self
    }

    /// Caps the backoff delay.
    #[must_use]
    pub fn max_timeout(mut self, max_timeout: Duration) -> Self {
        self.max_timeout = Some(max_timeout);
        self
    }

    /// Enables or disables randomized backoff delays.
    #[must_use]
    pub fn randomize(mut self, randomize: bool) -> Self {
        self.randomize = randomize;
        self
    }

    /// Returns the maximum number of retries.
    #[must_use]
    pub fn get_retries(&self) -> u32 {
        self.retries
    }

    /// Returns the backoff growth factor.
    #[must_use]
    pub fn get_factor(&self) -> f64 {
        self.factor
    }

    /// Returns the delay before the first retry.
    #[must_use]
    pub fn get_min_timeout(&self) -> Duration {
        self.min_timeout
    }

    /// Returns the backoff ceiling, if any.
    #[must_use]
    pub fn get_max_timeout(&self) -> Option<Duration> {
        self.max_timeout
    }

    /// Returns whether backoff delays are randomized.
    #[must_use]
    pub fn get_randomize(&self) -> bool {
        self.randomize
    }
}
