// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::fmt::{Debug, Display};
use std::time::Duration;

use layered::Service;
use tick::Clock;

use super::backoff::Backoff;
use super::{RetryControllerBuilder, RetryOptions};
use crate::BreakerError;
use crate::breaker::{BreakerHandle, BreakerOptions, CircuitBreaker, CircuitState};
use crate::stats::Stats;
use crate::telemetry::RETRY_EVENT;
use crate::utils::{Rnd, define_fn_wrapper};

define_fn_wrapper!(ShouldRetry<In, E>(Fn(error: &BreakerError<E>, input: &In) -> bool));

/// Retries calls made through a [`CircuitBreaker`], backing off exponentially between attempts.
///
/// A failed attempt is retried only while all of the following hold:
///
/// - attempts remain (at most `retries + 1` attempts are made),
/// - the breaker is still closed,
/// - the `should_retry` predicate accepts the error and input.
///
/// Calls rejected by an open breaker are never retried. When retrying stops, the caller receives
/// the error of the last attempt as is.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use layered::Execute;
/// use tick::Clock;
///
/// use circuit_fuses::RetryController;
///
/// # async fn example(clock: Clock) {
/// let controller = RetryController::builder("payments", &clock)
///     .max_failures(3)
///     .retries(2)
///     .min_timeout(Duration::from_millis(100))
///     .should_retry(|error, _amount: &u64| !error.is_timeout())
///     .build(Execute::new(|amount: u64| async move { Ok::<_, String>(amount) }));
///
/// assert_eq!(controller.run_command(250).await.unwrap(), 250);
/// # }
/// ```
pub struct RetryController<In, S, E> {
    pub(super) breaker: CircuitBreaker<S, E>,
    pub(super) options: RetryOptions,
    pub(super) should_retry: ShouldRetry<In, E>,
    pub(super) backoff: Backoff,
}

impl<In, E> RetryController<In, (), E> {
    /// Starts building a controller together with the breaker it drives.
    #[must_use]
    pub fn builder(name: impl Into<Cow<'static, str>>, clock: &Clock) -> RetryControllerBuilder<In, E> {
        RetryControllerBuilder::new(CircuitBreaker::builder(name, clock))
    }
}

impl<In, S, E> RetryController<In, S, E> {
    /// Creates a controller retrying calls made through an existing breaker.
    ///
    /// Every error is considered retryable; use [`with_should_retry`][Self::with_should_retry] to
    /// change that.
    #[must_use]
    pub fn new(breaker: CircuitBreaker<S, E>, options: RetryOptions) -> Self {
        Self::from_parts(breaker, options, ShouldRetry::new(|_, _| true), Rnd::default())
    }

    pub(super) fn from_parts(breaker: CircuitBreaker<S, E>, options: RetryOptions, should_retry: ShouldRetry<In, E>, rnd: Rnd) -> Self {
        Self {
            backoff: Backoff::new(&options, rnd),
            breaker,
            options,
            should_retry,
        }
    }

    /// Replaces the predicate deciding whether a failed attempt may be retried.
    #[must_use]
    pub fn with_should_retry(mut self, should_retry: impl Fn(&BreakerError<E>, &In) -> bool + Send + Sync + 'static) -> Self {
        self.should_retry = ShouldRetry::new(should_retry);
        self
    }

    /// Runs the command, retrying failed attempts as configured.
    ///
    /// Every attempt receives a clone of `input`.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt once retrying stops. See [`RetryController`] for
    /// when that happens.
    pub async fn run_command<T>(&self, input: In) -> Result<T, BreakerError<E>>
    where
        S: Service<In, Out = Result<T, E>>,
        In: Clone,
        E: Display,
    {
        let max_attempts = self.options.get_retries().saturating_add(1);
        let mut delays = self.backoff.delays();
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);

            let delay = match self.breaker.execute(input.clone()).await {
                Ok(value) => return Ok(value),
                Err(error) => match self.stop_reason(attempt, max_attempts, &error, &input) {
                    Some(reason) => {
                        self.emit_exhausted(attempt, reason, &error);
                        return Err(error);
                    }
                    None => delays.next().unwrap_or(Duration::ZERO),
                },
            };

            self.emit_retry(attempt, delay);
            self.breaker.core().clock().delay(delay).await;
        }
    }

    /// Runs the command on the Tokio runtime and hands the outcome to `callback`.
    ///
    /// The callback is invoked exactly once, with the same value [`run_command`][Self::run_command]
    /// would have returned. The returned handle may be awaited or dropped.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    #[cfg(any(feature = "tokio", test))]
    pub fn run_command_with_callback<T, F>(&self, input: In, callback: F) -> tokio::task::JoinHandle<()>
    where
        S: Service<In, Out = Result<T, E>> + Clone + 'static,
        In: Clone + Send + Sync + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
        F: FnOnce(Result<T, BreakerError<E>>) + Send + 'static,
    {
        let controller = self.clone();

        tokio::spawn(async move {
            let result = controller.run_command(input).await;
            callback(result);
        })
    }

    /// Returns the breaker the controller drives.
    #[must_use]
    pub fn breaker(&self) -> &CircuitBreaker<S, E> {
        &self.breaker
    }

    /// Returns a type-erased handle to the controller's breaker.
    #[must_use]
    pub fn handle(&self) -> BreakerHandle {
        self.breaker.handle()
    }

    /// Returns the retry options.
    #[must_use]
    pub fn options(&self) -> &RetryOptions {
        &self.options
    }

    /// Returns the options of the controller's breaker.
    #[must_use]
    pub fn breaker_options(&self) -> &BreakerOptions {
        self.breaker.options()
    }

    /// Returns the name of the controller's breaker.
    #[must_use]
    pub fn name(&self) -> &str {
        self.breaker.name()
    }

    /// See [`CircuitBreaker::is_closed`].
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.breaker.is_closed()
    }

    /// See [`CircuitBreaker::state`].
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// See [`CircuitBreaker::force_open`].
    pub fn force_open(&self) {
        self.breaker.force_open();
    }

    /// See [`CircuitBreaker::stats`].
    #[must_use]
    pub fn stats(&self) -> Stats {
        self.breaker.stats()
    }

    /// Returns the number of calls admitted to the command, counting every attempt.
    #[must_use]
    pub fn total_requests(&self) -> u64 {
        self.breaker.total_requests()
    }

    /// See [`CircuitBreaker::timeouts`].
    #[must_use]
    pub fn timeouts(&self) -> u64 {
        self.breaker.timeouts()
    }

    /// See [`CircuitBreaker::successful_responses`].
    #[must_use]
    pub fn successful_responses(&self) -> u64 {
        self.breaker.successful_responses()
    }

    /// See [`CircuitBreaker::failed_responses`].
    #[must_use]
    pub fn failed_responses(&self) -> u64 {
        self.breaker.failed_responses()
    }

    /// See [`CircuitBreaker::concurrent_requests`].
    #[must_use]
    pub fn concurrent_requests(&self) -> u64 {
        self.breaker.concurrent_requests()
    }

    /// See [`CircuitBreaker::rejected_requests`].
    #[must_use]
    pub fn rejected_requests(&self) -> u64 {
        self.breaker.rejected_requests()
    }

    /// See [`CircuitBreaker::average_response_time`].
    #[must_use]
    pub fn average_response_time(&self) -> Duration {
        self.breaker.average_response_time()
    }

    fn stop_reason(&self, attempt: u32, max_attempts: u32, error: &BreakerError<E>, input: &In) -> Option<&'static str> {
        if error.is_rejected() {
            Some("rejected")
        } else if attempt >= max_attempts {
            Some("retries_exhausted")
        } else if !self.breaker.is_closed() {
            Some("breaker_open")
        } else if !self.should_retry.call(error, input) {
            Some("not_retryable")
        } else {
            None
        }
    }

    fn emit_retry(&self, attempt: u32, delay: Duration) {
        let core = self.breaker.core();
        core.telemetry().report(core.name(), RETRY_EVENT, CircuitState::Closed.as_str());

        tracing::event!(
            name: "circuit_fuses.retry",
            tracing::Level::DEBUG,
            breaker.name = %core.name(),
            retry.attempt = attempt,
            retry.delay_ms = delay.as_millis(),
        );
    }

    fn emit_exhausted(&self, attempts: u32, reason: &'static str, error: &BreakerError<E>)
    where
        E: Display,
    {
        tracing::event!(
            name: "circuit_fuses.retry.exhausted",
            tracing::Level::WARN,
            breaker.name = %self.breaker.name(),
            retry.attempts = attempts,
            retry.stop_reason = reason,
            error = %error,
        );
    }
}

impl<In, S: Clone, E> Clone for RetryController<In, S, E> {
    fn clone(&self) -> Self {
        Self {
            breaker: self.breaker.clone(),
            options: self.options.clone(),
            should_retry: self.should_retry.clone(),
            backoff: self.backoff.clone(),
        }
    }
}

impl<In, S, E> Debug for RetryController<In, S, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryController")
            .field("breaker", &self.breaker)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<In, S, E> From<&RetryController<In, S, E>> for BreakerHandle {
    fn from(controller: &RetryController<In, S, E>) -> Self {
        controller.handle()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(not(miri))]
#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use layered::Execute;
    use tick::ClockControl;

    use super::*;
    use crate::testing::LogCapture;

    /// A command failing with `"fail {n}"` for its first `failures` calls, then succeeding with the
    /// number of calls made.
    fn flaky(calls: &Arc<AtomicU32>, failures: u32) -> impl Service<(), Out = Result<u32, String>> + Clone + 'static {
        let calls = Arc::clone(calls);

        Execute::new(move |(): ()| {
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { if call <= failures { Err(format!("fail {call}")) } else { Ok(call) } }
        })
    }

    fn auto_clock() -> Clock {
        ClockControl::new().auto_advance_timers(true).to_clock()
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let clock = auto_clock();
        let calls = Arc::new(AtomicU32::new(0));
        let controller = RetryController::builder("flaky", &clock)
            .retries(5)
            .min_timeout(Duration::from_millis(10))
            .build(flaky(&calls, 2));

        assert_eq!(controller.run_command(()).await.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(controller.total_requests(), 3);
        assert_eq!(controller.failed_responses(), 2);
        assert_eq!(controller.successful_responses(), 1);
    }

    #[tokio::test]
    async fn stops_once_breaker_opens() {
        let clock = auto_clock();
        let calls = Arc::new(AtomicU32::new(0));
        let controller = RetryController::builder("fragile", &clock)
            .max_failures(1)
            .retries(5)
            .build(flaky(&calls, u32::MAX));

        let error = controller.run_command(()).await.unwrap_err();

        assert_eq!(error.into_command().as_deref(), Some("fail 1"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!controller.is_closed());
    }

    #[tokio::test]
    async fn gives_up_after_retries() {
        let clock = auto_clock();
        let calls = Arc::new(AtomicU32::new(0));
        let controller = RetryController::builder("stubborn", &clock)
            .max_failures(100)
            .retries(3)
            .min_timeout(Duration::from_millis(1))
            .build(flaky(&calls, u32::MAX));

        let error = controller.run_command(()).await.unwrap_err();

        assert_eq!(error.into_command().as_deref(), Some("fail 4"));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn zero_retries_attempts_once() {
        let clock = auto_clock();
        let calls = Arc::new(AtomicU32::new(0));
        let controller = RetryController::builder("once", &clock).retries(0).build(flaky(&calls, 1));

        controller.run_command(()).await.unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn should_retry_can_stop_early() {
        let clock = auto_clock();
        let calls = Arc::new(AtomicU32::new(0));
        let controller = RetryController::builder("picky", &clock)
            .should_retry(|error: &BreakerError<String>, _input: &()| error.as_command().is_none_or(|message| message != "fail 1"))
            .build(flaky(&calls, 3));

        let error = controller.run_command(()).await.unwrap_err();

        assert_eq!(error.into_command().as_deref(), Some("fail 1"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn should_retry_sees_the_input() {
        let clock = auto_clock();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let breaker = CircuitBreaker::builder("inputs", &clock).build(Execute::new(move |id: u32| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            async move { Err::<(), _>(format!("missing {id}")) }
        }));

        let controller = RetryController::new(breaker, RetryOptions::default().retries(2)).with_should_retry(|_, id: &u32| *id != 404);

        controller.run_command(404).await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        controller.run_command(7).await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn rejections_are_never_retried() {
        let clock = auto_clock();
        let calls = Arc::new(AtomicU32::new(0));
        let controller = RetryController::builder("rejecting", &clock).build(flaky(&calls, 0));

        controller.force_open();
        let error = controller.run_command(()).await.unwrap_err();

        assert!(error.is_rejected());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(controller.rejected_requests(), 1);
    }

    #[tokio::test]
    async fn waits_backoff_between_attempts() {
        let control = ClockControl::new().auto_advance_timers(true);
        let clock = control.to_clock();
        let calls = Arc::new(AtomicU32::new(0));
        let controller = RetryController::builder("patient", &clock)
            .retries(3)
            .min_timeout(Duration::from_millis(100))
            .max_timeout(Duration::from_millis(300))
            .build(flaky(&calls, 3));

        let stopwatch = clock.stopwatch();
        controller.run_command(()).await.unwrap();

        // 100 + 200 + 300 (capped)
        assert_eq!(stopwatch.elapsed(), Duration::from_millis(600));
    }

    #[tokio::test]
    async fn randomized_backoff_uses_random_source() {
        let clock = auto_clock();
        let calls = Arc::new(AtomicU32::new(0));
        let breaker = CircuitBreaker::builder("jittered", &clock).build(flaky(&calls, 2));
        let options = RetryOptions::default().min_timeout(Duration::from_millis(100)).randomize(true);
        let controller = RetryController::from_parts(breaker, options, ShouldRetry::new(|_, _| true), Rnd::new_fixed(0.5));

        let stopwatch = clock.stopwatch();
        controller.run_command(()).await.unwrap();

        // 150 + 300
        assert_eq!(stopwatch.elapsed(), Duration::from_millis(450));
    }

    #[tokio::test]
    async fn callback_receives_result_once() {
        let clock = auto_clock();
        let calls = Arc::new(AtomicU32::new(0));
        let controller = RetryController::builder("callback", &clock)
            .min_timeout(Duration::from_millis(1))
            .build(flaky(&calls, 1));

        let (sender, receiver) = tokio::sync::oneshot::channel();
        controller
            .run_command_with_callback((), move |result| {
                sender.send(result).unwrap();
            })
            .await
            .unwrap();

        assert_eq!(receiver.await.unwrap().unwrap(), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_are_logged() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let clock = auto_clock();
        let calls = Arc::new(AtomicU32::new(0));
        let controller = RetryController::builder("logged", &clock)
            .max_failures(10)
            .retries(1)
            .build(flaky(&calls, u32::MAX));

        controller.run_command(()).await.unwrap_err();

        capture.assert_contains("WARN");
        capture.assert_contains("breaker.name=logged");
        capture.assert_contains("retry.attempts=2");
        capture.assert_contains("retries_exhausted");
        capture.assert_contains("error=fail 2");
        capture.assert_contains("retry.delay_ms=1000");
    }

    #[test]
    fn handle_and_accessors_delegate() {
        let clock = ClockControl::new().to_clock();
        let calls = Arc::new(AtomicU32::new(0));
        let controller = RetryController::builder("delegating", &clock).build(flaky(&calls, 0));

        let handle = BreakerHandle::from(&controller);
        handle.force_open();

        assert_eq!(controller.name(), "delegating");
        assert_eq!(controller.state(), CircuitState::Open);
        assert!(!controller.stats().breaker.is_closed);
        assert!(controller.breaker().handle().ptr_eq(&handle));
        assert_eq!(controller.breaker_options(), &BreakerOptions::default());
        assert_eq!(controller.options(), &RetryOptions::default());
        assert_eq!(controller.concurrent_requests(), 0);
        assert_eq!(controller.timeouts(), 0);
        assert_eq!(controller.average_response_time(), Duration::ZERO);
        assert!(format!("{controller:?}").contains("delegating"));
    }
}
