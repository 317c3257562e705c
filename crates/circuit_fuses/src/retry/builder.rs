// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use layered::Service;

use super::RetryOptions;
use super::service::{RetryController, ShouldRetry};
use crate::BreakerError;
use crate::breaker::{BreakerBuilder, BreakerOptions, TripEvent};
use crate::utils::Rnd;

/// Builder for a [`RetryController`] and the breaker it drives, created by
/// [`RetryController::builder`].
///
/// Breaker settings and retry settings are configured side by side; see [`BreakerOptions`] and
/// [`RetryOptions`] for their meaning and defaults.
#[derive(Debug)]
pub struct RetryControllerBuilder<In, E> {
    breaker: BreakerBuilder<E>,
    options: RetryOptions,
    should_retry: ShouldRetry<In, E>,
}

impl<In, E> RetryControllerBuilder<In, E> {
    pub(crate) fn new(breaker: BreakerBuilder<E>) -> Self {
        Self {
            breaker,
            options: RetryOptions::default(),
            should_retry: ShouldRetry::new(|_, _| true),
        }
    }

    /// Replaces all breaker thresholds and timings at once.
    #[must_use]
    pub fn breaker_options(mut self, options: BreakerOptions) -> Self {
        self.breaker = self.breaker.options(options);
        self
    }

    /// Sets the deadline of a single attempt.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.breaker = self.breaker.timeout(timeout);
        self
    }

    /// Sets how many qualifying failures in a row trip the breaker.
    #[must_use]
    pub fn max_failures(mut self, max_failures: u32) -> Self {
        self.breaker = self.breaker.max_failures(max_failures);
        self
    }

    /// Sets how long the breaker stays open before admitting a probe call.
    #[must_use]
    pub fn reset_timeout(mut self, reset_timeout: Duration) -> Self {
        self.breaker = self.breaker.reset_timeout(reset_timeout);
        self
    }

    /// Sets the classifier deciding which command errors count towards the trip threshold.
    #[must_use]
    pub fn error_fn(mut self, error_fn: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.breaker = self.breaker.error_fn(error_fn);
        self
    }

    /// Registers a listener invoked every time the breaker opens.
    #[must_use]
    pub fn on_trip(mut self, listener: impl Fn(&TripEvent) + Send + Sync + 'static) -> Self {
        self.breaker = self.breaker.on_trip(listener);
        self
    }

    /// Reports breaker and retry events into the `resilience.event` counter of the given meter
    /// provider.
    #[cfg(any(feature = "metrics", test))]
    #[must_use]
    pub fn metrics(mut self, meter_provider: &dyn opentelemetry::metrics::MeterProvider) -> Self {
        self.breaker = self.breaker.metrics(meter_provider);
        self
    }

    /// Replaces all retry settings at once.
    #[must_use]
    pub fn options(mut self, options: RetryOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the maximum number of retries after the first attempt.
    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.options = self.options.retries(retries);
        self
    }

    /// Sets the growth factor of the backoff delay.
    #[must_use]
    pub fn factor(mut self, factor: f64) -> Self {
        self.options = self.options.factor(factor);
        self
    }

    /// Sets the delay before the first retry.
    #[must_use]
    pub fn min_timeout(mut self, min_timeout: Duration) -> Self {
        self.options = self.options.min_timeout(min_timeout);
        self
    }

    /// Caps the backoff delay.
    #[must_use]
    pub fn max_timeout(mut self, max_timeout: Duration) -> Self {
        self.options = self.options.max_timeout(max_timeout);
        self
    }

    /// Enables or disables randomized backoff delays.
    #[must_use]
    pub fn randomize(mut self, randomize: bool) -> Self {
        self.options = self.options.randomize(randomize);
        self
    }

    /// Sets the predicate deciding whether a failed attempt may be retried.
    ///
    /// The predicate sees the attempt's error and the command input. By default every error is
    /// retryable.
    #[must_use]
    pub fn should_retry(mut self, should_retry: impl Fn(&BreakerError<E>, &In) -> bool + Send + Sync + 'static) -> Self {
        self.should_retry = ShouldRetry::new(should_retry);
        self
    }

    /// Builds the controller and its breaker around `command`.
    #[must_use]
    pub fn build<S, T>(self, command: S) -> RetryController<In, S, E>
    where
        S: Service<In, Out = Result<T, E>>,
    {
        RetryController::from_parts(self.breaker.build(command), self.options, self.should_retry, Rnd::default())
    }
}
