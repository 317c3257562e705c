// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::fmt::Debug;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{Either, select};
use layered::Service;
use tick::Clock;

use super::inner::BreakerCore;
use super::engine::{EnterResult, ExecutionMode, ExecutionResult};
use super::{BreakerBuilder, BreakerHandle, BreakerOptions, CircuitState, OnTrip, TripEvent};
use crate::BreakerError;
use crate::stats::Stats;
use crate::utils::define_fn_wrapper;

define_fn_wrapper!(ErrorFn<E>(Fn(error: &E) -> bool));

/// Protects a command with a circuit breaker.
///
/// Every call made through [`execute`][Self::execute] is subject to a deadline. Calls that fail
/// (as judged by the breaker's error classifier) or miss the deadline count towards the trip
/// threshold. Once `max_failures` of them happen in a row the breaker opens, rejects calls
/// without invoking the command and notifies its trip listeners. After the reset timeout a single
/// probe call is admitted; its outcome decides whether the breaker closes again.
///
/// Clones share the same state, so a breaker can be handed to any number of tasks.
///
/// # Examples
///
/// ```
/// use layered::Execute;
/// use tick::Clock;
///
/// use circuit_fuses::CircuitBreaker;
///
/// # async fn example(clock: Clock) {
/// let breaker = CircuitBreaker::builder("inventory", &clock)
///     .max_failures(3)
///     .build(Execute::new(|sku: u32| async move { Ok::<_, String>(sku * 2) }));
///
/// assert_eq!(breaker.execute(21).await.unwrap(), 42);
/// assert_eq!(breaker.total_requests(), 1);
/// # }
/// ```
pub struct CircuitBreaker<S, E> {
    pub(super) core: Arc<BreakerCore>,
    pub(super) error_fn: ErrorFn<E>,
    pub(super) command: S,
}

impl<E> CircuitBreaker<(), E> {
    /// Starts building a breaker named `name` that measures time with `clock`.
    ///
    /// The name identifies the breaker in trip notifications and logs.
    #[must_use]
    pub fn builder(name: impl Into<Cow<'static, str>>, clock: &Clock) -> BreakerBuilder<E> {
        BreakerBuilder::new(name.into(), clock.clone())
    }
}

impl<S, E> CircuitBreaker<S, E> {
    /// Executes the command through the breaker.
    ///
    /// # Errors
    ///
    /// - [`BreakerError::Rejected`] when the breaker is open. The command is not invoked.
    /// - [`BreakerError::Timeout`] when the command does not complete within the configured
    ///   timeout. The command's future is dropped.
    /// - [`BreakerError::Command`] carrying the command's own error, unchanged, regardless of
    ///   whether the error counted towards the trip threshold.
    pub async fn execute<In, T>(&self, input: In) -> Result<T, BreakerError<E>>
    where
        S: Service<In, Out = Result<T, E>>,
    {
        let EnterResult::Accepted { mode } = self.core.enter() else {
            return Err(BreakerError::Rejected {
                name: self.core.name().clone(),
            });
        };

        let in_flight = InFlight::new(&self.core, mode);
        let clock = self.core.clock();
        let timeout = self.core.options().get_timeout();
        let stopwatch = clock.stopwatch();

        let command = pin!(self.command.execute(input));
        let deadline = pin!(clock.delay(timeout));

        match select(command, deadline).await {
            Either::Left((Ok(value), _)) => {
                in_flight.complete(ExecutionResult::Success {
                    latency: stopwatch.elapsed(),
                });
                Ok(value)
            }
            Either::Left((Err(error), _)) => {
                let qualifying = self.error_fn.call(&error);
                in_flight.complete(ExecutionResult::Failure { qualifying });
                Err(BreakerError::Command(error))
            }
            Either::Right(((), _)) => {
                in_flight.complete(ExecutionResult::Timeout);
                Err(BreakerError::Timeout { timeout })
            }
        }
    }

    /// Returns the name of the breaker.
    #[must_use]
    pub fn name(&self) -> &str {
        self.core.name()
    }

    /// Returns the options the breaker was built with.
    #[must_use]
    pub fn options(&self) -> &BreakerOptions {
        self.core.options()
    }

    /// Returns `true` unless the breaker is open and its reset timeout has not yet elapsed.
    ///
    /// A breaker waiting for (or running) its probe call counts as closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    /// Returns the current circuit state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.core.state()
    }

    /// Opens the breaker and notifies trip listeners.
    ///
    /// Does nothing if the breaker is already open, so forcing an open breaker neither restarts
    /// its reset timer nor produces another notification.
    pub fn force_open(&self) {
        self.core.force_open();
    }

    /// Returns a snapshot of the breaker's counters and state.
    #[must_use]
    pub fn stats(&self) -> Stats {
        self.core.stats()
    }

    /// Returns the number of calls admitted to the command.
    #[must_use]
    pub fn total_requests(&self) -> u64 {
        self.core.request_stats().total
    }

    /// Returns the number of calls that missed their deadline.
    #[must_use]
    pub fn timeouts(&self) -> u64 {
        self.core.request_stats().timeouts
    }

    /// Returns the number of successful calls.
    #[must_use]
    pub fn successful_responses(&self) -> u64 {
        self.core.request_stats().success
    }

    /// Returns the number of calls that failed with a qualifying error.
    #[must_use]
    pub fn failed_responses(&self) -> u64 {
        self.core.request_stats().failure
    }

    /// Returns the number of calls currently in flight.
    #[must_use]
    pub fn concurrent_requests(&self) -> u64 {
        self.core.request_stats().concurrent
    }

    /// Returns the number of calls rejected because the breaker was open.
    #[must_use]
    pub fn rejected_requests(&self) -> u64 {
        self.core.request_stats().rejected
    }

    /// Returns the running average latency of successful calls.
    #[must_use]
    pub fn average_response_time(&self) -> Duration {
        self.core.request_stats().average_time
    }

    /// Registers a listener invoked every time the breaker opens.
    ///
    /// Listeners run on the task that caused the transition, after the breaker has released its
    /// internal lock.
    pub fn on_trip(&self, listener: impl Fn(&TripEvent) + Send + Sync + 'static) {
        self.core.add_listener(OnTrip::new(listener));
    }

    /// Returns a type-erased handle to this breaker.
    #[must_use]
    pub fn handle(&self) -> BreakerHandle {
        BreakerHandle::new(Arc::clone(&self.core))
    }

    pub(crate) fn core(&self) -> &BreakerCore {
        &self.core
    }
}

impl<S: Clone, E> Clone for CircuitBreaker<S, E> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            error_fn: self.error_fn.clone(),
            command: self.command.clone(),
        }
    }
}

impl<S, E> Debug for CircuitBreaker<S, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", self.core.name())
            .field("state", &self.core.state())
            .finish_non_exhaustive()
    }
}

/// Tracks an admitted call. Dropping it without completing releases the call as abandoned, which
/// happens when the caller drops the `execute` future.
struct InFlight<'a> {
    core: &'a BreakerCore,
    mode: ExecutionMode,
    completed: bool,
}

impl<'a> InFlight<'a> {
    fn new(core: &'a BreakerCore, mode: ExecutionMode) -> Self {
        Self {
            core,
            mode,
            completed: false,
        }
    }

    fn complete(mut self, result: ExecutionResult) {
        self.completed = true;
        self.core.exit(result, self.mode);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.core.abandon(self.mode);
        }
    }
}
