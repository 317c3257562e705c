// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Request accounting for circuit breakers.
//!
//! The recorder itself is owned by the breaker engine and only mutated under the engine lock, so
//! counters and state transitions are always observed together. Callers only ever see [`Stats`]
//! snapshots, which are plain copies taken at the moment [`stats()`][crate::breaker::CircuitBreaker::stats]
//! is called.

use std::time::Duration;

use crate::breaker::CircuitState;

/// A point-in-time snapshot of a breaker's request counters and state.
///
/// The snapshot is a copy; requests completing after it was taken do not change it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct Stats {
    /// Request counters.
    pub requests: RequestStats,
    /// Breaker state at snapshot time.
    pub breaker: BreakerStats,
}

/// Request counters of a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub struct RequestStats {
    /// Calls admitted to the command over the breaker's lifetime.
    pub total: u64,
    /// Calls that missed their deadline.
    pub timeouts: u64,
    /// Calls that completed successfully.
    pub success: u64,
    /// Calls that failed with an error the breaker's classifier counted as a failure.
    pub failure: u64,
    /// Calls currently in flight.
    pub concurrent: u64,
    /// Calls rejected without invoking the command because the breaker was open.
    pub rejected: u64,
    /// Running average latency of successful calls.
    pub average_time: Duration,
}

/// Breaker state as seen by a [`Stats`] snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct BreakerStats {
    /// Whether the breaker currently admits calls.
    pub is_closed: bool,
    /// The underlying circuit state.
    pub state: CircuitState,
}

#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    total: u64,
    timeouts: u64,
    successes: u64,
    failures: u64,
    rejected: u64,
    concurrent: u64,
    total_latency_nanos: u128,
}

impl StatsRecorder {
    pub fn record_admitted(&mut self) {
        self.total = self.total.saturating_add(1);
        self.concurrent = self.concurrent.saturating_add(1);
    }

    pub fn record_rejected(&mut self) {
        self.rejected = self.rejected.saturating_add(1);
    }

    pub fn record_success(&mut self, latency: Duration) {
        self.leave();
        self.successes = self.successes.saturating_add(1);
        self.total_latency_nanos = self.total_latency_nanos.saturating_add(latency.as_nanos());
    }

    pub fn record_failure(&mut self, qualifying: bool) {
        self.leave();

        if qualifying {
            self.failures = self.failures.saturating_add(1);
        }
    }

    pub fn record_timeout(&mut self) {
        self.leave();
        self.timeouts = self.timeouts.saturating_add(1);
    }

    pub fn record_abandoned(&mut self) {
        self.leave();
    }

    pub fn snapshot(&self) -> RequestStats {
        RequestStats {
            total: self.total,
            timeouts: self.timeouts,
            success: self.successes,
            failure: self.failures,
            concurrent: self.concurrent,
            rejected: self.rejected,
            average_time: self.average_time(),
        }
    }

    fn average_time(&self) -> Duration {
        if self.successes == 0 {
            return Duration::ZERO;
        }

        let nanos = self.total_latency_nanos / u128::from(self.successes);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    fn leave(&mut self) {
        self.concurrent = self.concurrent.saturating_sub(1);
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_recorder_is_empty() {
        let stats = StatsRecorder::default().snapshot();

        assert_eq!(stats, RequestStats::default());
    }

    #[test]
    fn admitted_and_finished_requests_balance_concurrency() {
        let mut recorder = StatsRecorder::default();

        recorder.record_admitted();
        recorder.record_admitted();
        recorder.record_admitted();
        recorder.record_admitted();
        assert_eq!(recorder.snapshot().concurrent, 4);

        recorder.record_success(Duration::from_millis(10));
        recorder.record_failure(true);
        recorder.record_timeout();
        recorder.record_abandoned();

        let stats = recorder.snapshot();
        assert_eq!(stats.concurrent, 0);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.success, 1);
        assert_eq!(stats.failure, 1);
        assert_eq!(stats.timeouts, 1);
    }

    #[test]
    fn concurrency_never_goes_negative() {
        let mut recorder = StatsRecorder::default();

        recorder.record_abandoned();
        recorder.record_failure(true);

        assert_eq!(recorder.snapshot().concurrent, 0);
    }

    #[test]
    fn non_qualifying_failure_is_not_counted() {
        let mut recorder = StatsRecorder::default();

        recorder.record_admitted();
        recorder.record_failure(false);

        let stats = recorder.snapshot();
        assert_eq!(stats.failure, 0);
        assert_eq!(stats.total, 1);
    }

    #[test]
    fn average_is_running_mean_of_successes() {
        let mut recorder = StatsRecorder::default();

        for millis in [100, 200, 600] {
            recorder.record_admitted();
            recorder.record_success(Duration::from_millis(millis));
        }

        assert_eq!(recorder.snapshot().average_time, Duration::from_millis(300));
    }

    #[test]
    fn rejected_requests_do_not_count_toward_total() {
        let mut recorder = StatsRecorder::default();

        recorder.record_rejected();
        recorder.record_rejected();

        let stats = recorder.snapshot();
        assert_eq!(stats.rejected, 2);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.concurrent, 0);
    }
}
