// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Optional OpenTelemetry metrics.
//!
//! Breakers report every resilience event into a single `resilience.event` counter, annotated with
//! the breaker name and an event name.

pub(crate) const CIRCUIT_OPENED_EVENT: &str = "circuit_opened";
pub(crate) const CIRCUIT_CLOSED_EVENT: &str = "circuit_closed";
pub(crate) const CIRCUIT_REJECTED_EVENT: &str = "circuit_rejected";
pub(crate) const RETRY_EVENT: &str = "retry";

#[cfg(any(feature = "metrics", test))]
pub(crate) mod metrics {
    use opentelemetry::InstrumentationScope;
    use opentelemetry::metrics::{Counter, Meter, MeterProvider};

    const METER_NAME: &str = "circuit_fuses";
    const VERSION: &str = "v0.1.0";
    const SCHEMA_URL: &str = "https://opentelemetry.io/schemas/1.47.0";

    /// Key annotating the breaker that emitted an event.
    pub(crate) const BREAKER_NAME: &str = "circuit_fuses.breaker.name";

    /// Key annotating the emitted event.
    pub(crate) const EVENT_NAME: &str = "resilience.event.name";

    /// Key annotating the circuit state after the event.
    pub(crate) const CIRCUIT_STATE: &str = "circuit_fuses.breaker.state";

    pub(crate) fn create_meter(meter_provider: &dyn MeterProvider) -> Meter {
        meter_provider.meter_with_scope(
            InstrumentationScope::builder(METER_NAME)
                .with_version(VERSION)
                .with_schema_url(SCHEMA_URL)
                .build(),
        )
    }

    pub(crate) fn create_resilience_event_counter(meter: &Meter) -> Counter<u64> {
        meter
            .u64_counter("resilience.event")
            .with_description("Emitted upon the occurrence of a resilience event.")
            .with_unit("u64")
            .build()
    }
}

/// Metric sink shared by a breaker and the retry controllers built on it.
#[derive(Debug, Clone, Default)]
pub(crate) struct Telemetry {
    #[cfg(any(feature = "metrics", test))]
    resilience_events: Option<opentelemetry::metrics::Counter<u64>>,
}

impl Telemetry {
    #[cfg(any(feature = "metrics", test))]
    pub fn with_meter_provider(meter_provider: &dyn opentelemetry::metrics::MeterProvider) -> Self {
        let meter = metrics::create_meter(meter_provider);

        Self {
            resilience_events: Some(metrics::create_resilience_event_counter(&meter)),
        }
    }

    #[cfg_attr(
        not(any(feature = "metrics", test)),
        expect(unused_variables, clippy::unused_self, reason = "unused when metrics feature not used")
    )]
    pub fn report(&self, breaker_name: &str, event: &'static str, state: &'static str) {
        #[cfg(any(feature = "metrics", test))]
        if let Some(counter) = &self.resilience_events {
            use metrics::{BREAKER_NAME, CIRCUIT_STATE, EVENT_NAME};

            counter.add(
                1,
                &[
                    opentelemetry::KeyValue::new(BREAKER_NAME, breaker_name.to_owned()),
                    opentelemetry::KeyValue::new(EVENT_NAME, event),
                    opentelemetry::KeyValue::new(CIRCUIT_STATE, state),
                ],
            );
        }
    }
}
