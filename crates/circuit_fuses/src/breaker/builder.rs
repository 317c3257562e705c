// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use layered::Service;
use tick::Clock;

use super::inner::BreakerCore;
use super::service::ErrorFn;
use super::{BreakerOptions, CircuitBreaker, OnTrip, TripEvent};
use crate::telemetry::Telemetry;

/// Builder for [`CircuitBreaker`], created by [`CircuitBreaker::builder`].
///
/// `E` is the error type of the protected command.
#[derive(Debug)]
pub struct BreakerBuilder<E> {
    name: Cow<'static, str>,
    clock: Clock,
    options: BreakerOptions,
    error_fn: ErrorFn<E>,
    listeners: Vec<OnTrip>,
    telemetry: Telemetry,
}

impl<E> BreakerBuilder<E> {
    pub(crate) fn new(name: Cow<'static, str>, clock: Clock) -> Self {
        Self {
            name,
            clock,
            options: BreakerOptions::default(),
            error_fn: ErrorFn::new(|_| true),
            listeners: Vec::new(),
            telemetry: Telemetry::default(),
        }
    }

    /// Replaces all thresholds and timings at once.
    #[must_use]
    pub fn options(mut self, options: BreakerOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the deadline of a single command call.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.timeout(timeout);
        self
    }

    /// Sets how many qualifying failures in a row trip the breaker.
    #[must_use]
    pub fn max_failures(mut self, max_failures: u32) -> Self {
        self.options = self.options.max_failures(max_failures);
        self
    }

    /// Sets how long the breaker stays open before admitting a probe call.
    #[must_use]
    pub fn reset_timeout(mut self, reset_timeout: Duration) -> Self {
        self.options = self.options.reset_timeout(reset_timeout);
        self
    }

    /// Sets the classifier deciding which command errors count towards the trip threshold.
    ///
    /// Errors the classifier rejects are still returned to the caller, they just leave the
    /// breaker's failure count untouched. By default every error counts.
    #[must_use]
    pub fn error_fn(mut self, error_fn: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.error_fn = ErrorFn::new(error_fn);
        self
    }

    /// Registers a listener invoked every time the breaker opens.
    #[must_use]
    pub fn on_trip(mut self, listener: impl Fn(&TripEvent) + Send + Sync + 'static) -> Self {
        self.listeners.push(OnTrip::new(listener));
        self
    }

    /// Reports breaker events into the `resilience.event` counter of the given meter provider.
    #[cfg(any(feature = "metrics", test))]
    #[must_use]
    pub fn metrics(mut self, meter_provider: &dyn opentelemetry::metrics::MeterProvider) -> Self {
        self.telemetry = Telemetry::with_meter_provider(meter_provider);
        self
    }

    /// Builds a breaker protecting `command`.
    #[must_use]
    pub fn build<S, In, T>(self, command: S) -> CircuitBreaker<S, E>
    where
        S: Service<In, Out = Result<T, E>>,
    {
        CircuitBreaker {
            core: Arc::new(BreakerCore::new(
                self.name,
                self.clock,
                self.options,
                self.listeners,
                self.telemetry,
            )),
            error_fn: self.error_fn,
            command,
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(not(miri))]
#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use layered::Execute;
    use opentelemetry_sdk::metrics::{InMemoryMetricExporter, SdkMeterProvider};
    use tick::ClockControl;

    use super::*;
    use crate::CircuitState;

    #[test]
    fn defaults() {
        let clock = ClockControl::new().to_clock();
        let breaker = CircuitBreaker::builder("defaults", &clock).build(Execute::new(|(): ()| async { Ok::<_, String>(()) }));

        assert_eq!(breaker.name(), "defaults");
        assert_eq!(breaker.options(), &BreakerOptions::default());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn setters_override_options() {
        let clock = ClockControl::new().to_clock();
        let breaker = CircuitBreaker::builder("custom", &clock)
            .options(BreakerOptions::default().max_failures(9))
            .timeout(Duration::from_secs(1))
            .reset_timeout(Duration::from_secs(2))
            .build(Execute::new(|(): ()| async { Ok::<_, String>(()) }));

        assert_eq!(breaker.options().get_max_failures(), 9);
        assert_eq!(breaker.options().get_timeout(), Duration::from_secs(1));
        assert_eq!(breaker.options().get_reset_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn builder_listeners_are_notified() {
        let clock = ClockControl::new().to_clock();
        let trips = Arc::new(AtomicU32::new(0));
        let trips_clone = Arc::clone(&trips);

        let breaker = CircuitBreaker::builder("listened", &clock)
            .on_trip(move |event| {
                assert_eq!(event.reason, crate::TripReason::Forced);
                trips_clone.fetch_add(1, Ordering::SeqCst);
            })
            .build(Execute::new(|(): ()| async { Ok::<_, String>(()) }));

        breaker.force_open();

        assert_eq!(trips.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn metrics_report_opened_and_rejected() {
        let exporter = InMemoryMetricExporter::default();
        let provider = SdkMeterProvider::builder().with_periodic_exporter(exporter.clone()).build();
        let clock = ClockControl::new().to_clock();

        let breaker = CircuitBreaker::builder("metered", &clock)
            .max_failures(1)
            .metrics(&provider)
            .build(Execute::new(|(): ()| async { Err::<(), _>("down".to_string()) }));

        breaker.execute(()).await.unwrap_err();
        breaker.execute(()).await.unwrap_err();
        provider.force_flush().unwrap();

        let str = format!("{:?}", exporter.get_finished_metrics().unwrap());
        assert!(str.contains("metered"));
        assert!(str.contains("circuit_opened"));
        assert!(str.contains("circuit_rejected"));
    }
}
