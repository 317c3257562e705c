// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::sync::{Mutex, Weak};

use tick::Clock;

use super::constants::ERR_POISONED_LOCK;
use super::engine::{Engine, EnterResult, ExecutionMode, ExecutionResult, ExitResult};
use super::{BreakerOptions, CircuitState, Listener, OnTrip, TripEvent, TripReason, TripSink};
use crate::stats::{RequestStats, Stats};
use crate::telemetry::{CIRCUIT_CLOSED_EVENT, CIRCUIT_OPENED_EVENT, CIRCUIT_REJECTED_EVENT, Telemetry};

/// State shared by a breaker, its clones, its handles and any fuse box it belongs to.
///
/// Everything here is independent of the protected command's types, which is what allows
/// breakers over different commands to be grouped together.
#[derive(Debug)]
pub(crate) struct BreakerCore {
    name: Cow<'static, str>,
    clock: Clock,
    options: BreakerOptions,
    engine: Engine,
    listeners: Mutex<Vec<Listener>>,
    telemetry: Telemetry,
}

impl BreakerCore {
    pub fn new(name: Cow<'static, str>, clock: Clock, options: BreakerOptions, listeners: Vec<OnTrip>, telemetry: Telemetry) -> Self {
        Self {
            engine: Engine::new(options.get_max_failures(), options.get_reset_timeout()),
            name,
            clock,
            options,
            listeners: Mutex::new(listeners.into_iter().map(Listener::Callback).collect()),
            telemetry,
        }
    }

    pub fn name(&self) -> &Cow<'static, str> {
        &self.name
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn options(&self) -> &BreakerOptions {
        &self.options
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn enter(&self) -> EnterResult {
        let result = self.engine.enter(self.clock.instant());

        if result == EnterResult::Rejected {
            self.telemetry.report(&self.name, CIRCUIT_REJECTED_EVENT, CircuitState::Open.as_str());

            tracing::event!(
                name: "circuit_fuses.breaker.rejected",
                tracing::Level::DEBUG,
                breaker.name = %self.name,
                breaker.state = CircuitState::Open.as_str(),
            );
        }

        result
    }

    pub fn exit(&self, result: ExecutionResult, mode: ExecutionMode) {
        if mode == ExecutionMode::Probe {
            tracing::event!(
                name: "circuit_fuses.breaker.probe",
                tracing::Level::INFO,
                breaker.name = %self.name,
                breaker.state = CircuitState::HalfOpen.as_str(),
                breaker.probe.result = result.as_str(),
            );
        }

        match self.engine.exit(result, mode, self.clock.instant()) {
            ExitResult::Unchanged => {}
            ExitResult::Opened => self.trip(TripReason::FailureThreshold),
            ExitResult::Reopened => self.trip(TripReason::ProbeFailed),
            ExitResult::Closed => {
                self.telemetry.report(&self.name, CIRCUIT_CLOSED_EVENT, CircuitState::Closed.as_str());

                tracing::event!(
                    name: "circuit_fuses.breaker.closed",
                    tracing::Level::INFO,
                    breaker.name = %self.name,
                    breaker.state = CircuitState::Closed.as_str(),
                );
            }
        }
    }

    pub fn abandon(&self, mode: ExecutionMode) {
        // An abandoned probe says nothing about the command's health, so the breaker quietly
        // waits for another reset period instead of notifying listeners.
        _ = self.engine.abandon(mode, self.clock.instant());
    }

    pub fn force_open(&self) {
        if !self.engine.force_open(self.clock.instant()) {
            return;
        }

        tracing::event!(
            name: "circuit_fuses.breaker.forced",
            tracing::Level::INFO,
            breaker.name = %self.name,
            breaker.state = CircuitState::Open.as_str(),
        );

        self.trip(TripReason::Forced);
    }

    pub fn is_closed(&self) -> bool {
        self.engine.is_closed(self.clock.instant())
    }

    pub fn state(&self) -> CircuitState {
        self.engine.state(self.clock.instant())
    }

    pub fn stats(&self) -> Stats {
        self.engine.stats(self.clock.instant())
    }

    pub fn request_stats(&self) -> RequestStats {
        self.engine.request_stats()
    }

    pub fn add_listener(&self, listener: OnTrip) {
        self.listeners.lock().expect(ERR_POISONED_LOCK).push(Listener::Callback(listener));
    }

    /// Subscribes `sink` to trips unless it is already subscribed.
    pub fn add_sink(&self, sink: Weak<dyn TripSink>) {
        let mut listeners = self.listeners.lock().expect(ERR_POISONED_LOCK);
        listeners.retain(Listener::is_alive);

        if !listeners.iter().any(|listener| listener.is_sink(&sink)) {
            listeners.push(Listener::Sink(sink));
        }
    }

    /// Returns the number of listeners whose receiver is still alive.
    #[cfg(test)]
    pub fn listener_count(&self) -> usize {
        let mut listeners = self.listeners.lock().expect(ERR_POISONED_LOCK);
        listeners.retain(Listener::is_alive);
        listeners.len()
    }

    fn trip(&self, reason: TripReason) {
        let event = TripEvent {
            name: self.name.clone(),
            tripped_at: self.clock.system_time(),
            reason,
        };

        self.telemetry.report(&self.name, CIRCUIT_OPENED_EVENT, CircuitState::Open.as_str());

        tracing::event!(
            name: "circuit_fuses.breaker.opened",
            tracing::Level::ERROR,
            breaker.name = %self.name,
            breaker.state = CircuitState::Open.as_str(),
            breaker.trip_reason = reason.as_str(),
            breaker.tripped_at = ?event.tripped_at,
            breaker.reset_timeout_ms = self.options.get_reset_timeout().as_millis(),
        );

        // Listeners may call back into this breaker or trip others, so they must run unlocked.
        let listeners = {
            let mut listeners = self.listeners.lock().expect(ERR_POISONED_LOCK);
            listeners.retain(Listener::is_alive);
            listeners.clone()
        };

        for listener in &listeners {
            listener.notify(&event);
        }
    }
}
