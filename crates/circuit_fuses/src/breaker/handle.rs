// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::{Arc, Weak};
use std::time::Duration;

use super::inner::BreakerCore;
use super::{CircuitBreaker, CircuitState, OnTrip, TripEvent, TripSink};
use crate::stats::Stats;

/// A clonable view of a breaker that does not depend on the protected command's types.
///
/// Handles observe and control the same breaker they were created from: they can read its
/// state and counters, force it open and subscribe to its trips, but cannot execute calls.
/// This is what a [`FuseBox`][crate::FuseBox] holds, which lets breakers over unrelated commands
/// share one box.
#[derive(Debug, Clone)]
pub struct BreakerHandle {
    core: Arc<BreakerCore>,
}

impl BreakerHandle {
    pub(crate) fn new(core: Arc<BreakerCore>) -> Self {
        Self { core }
    }

    pub(crate) fn downgrade(&self) -> Weak<BreakerCore> {
        Arc::downgrade(&self.core)
    }

    /// Returns the name of the breaker.
    #[must_use]
    pub fn name(&self) -> &str {
        self.core.name()
    }

    /// Returns `true` unless the breaker is open and its reset timeout has not yet elapsed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    /// Returns the current circuit state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.core.state()
    }

    /// Opens the breaker unless it is already open.
    pub fn force_open(&self) {
        self.core.force_open();
    }

    /// Returns a snapshot of the breaker's counters and state.
    #[must_use]
    pub fn stats(&self) -> Stats {
        self.core.stats()
    }

    /// Returns the number of calls currently in flight.
    #[must_use]
    pub fn concurrent_requests(&self) -> u64 {
        self.core.request_stats().concurrent
    }

    /// Returns the running average latency of successful calls.
    #[must_use]
    pub fn average_response_time(&self) -> Duration {
        self.core.request_stats().average_time
    }

    /// Registers a listener invoked every time the breaker opens.
    pub fn on_trip(&self, listener: impl Fn(&TripEvent) + Send + Sync + 'static) {
        self.core.add_listener(OnTrip::new(listener));
    }

    pub(crate) fn add_sink(&self, sink: Weak<dyn TripSink>) {
        self.core.add_sink(sink);
    }

    /// Returns `true` if both handles refer to the same breaker.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }
}

impl<S, E> From<&CircuitBreaker<S, E>> for BreakerHandle {
    fn from(breaker: &CircuitBreaker<S, E>) -> Self {
        breaker.handle()
    }
}
