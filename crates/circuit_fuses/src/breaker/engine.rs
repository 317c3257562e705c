// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::CircuitState;
use super::constants::ERR_POISONED_LOCK;
use crate::stats::{BreakerStats, RequestStats, Stats, StatsRecorder};

/// Determines how an admitted call is treated when it completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExecutionMode {
    /// Regular call made while the breaker is closed.
    Normal,

    /// The single call admitted after the reset timeout to test whether the command recovered.
    Probe,
}

/// Result of attempting to enter the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EnterResult {
    Accepted { mode: ExecutionMode },
    Rejected,
}

/// Classified outcome of a single command call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ExecutionResult {
    Success { latency: Duration },
    Failure { qualifying: bool },
    Timeout,
}

impl ExecutionResult {
    pub fn is_qualifying_failure(self) -> bool {
        matches!(self, Self::Failure { qualifying: true } | Self::Timeout)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Failure { qualifying: true } => "failure",
            Self::Failure { qualifying: false } => "ignored_failure",
            Self::Timeout => "timeout",
        }
    }
}

/// State change caused by a completed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExitResult {
    Unchanged,

    /// The trip threshold was reached while closed.
    Opened,

    /// The probe failed and the breaker opened again.
    Reopened,

    /// The probe succeeded.
    Closed,
}

/// The breaker state machine together with its request accounting.
///
/// Both live behind one lock so that counters and transitions are applied atomically with
/// respect to concurrent calls: when several failures reach the threshold at once, exactly one of
/// them observes the transition.
#[derive(Debug)]
pub(crate) struct Engine {
    state: Mutex<EngineState>,
    max_failures: u32,
    reset_timeout: Duration,
}

#[derive(Debug)]
struct EngineState {
    circuit: Circuit,
    stats: StatsRecorder,
}

#[derive(Debug, Clone, Copy)]
enum Circuit {
    Closed { failures: u32 },
    Open { open_until: Instant },
    HalfOpen,
}

impl Circuit {
    fn state(self, now: Instant) -> CircuitState {
        match self {
            Self::Closed { .. } => CircuitState::Closed,
            Self::Open { open_until } if now < open_until => CircuitState::Open,
            Self::Open { .. } | Self::HalfOpen => CircuitState::HalfOpen,
        }
    }
}

impl Engine {
    pub fn new(max_failures: u32, reset_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(EngineState {
                circuit: Circuit::Closed { failures: 0 },
                stats: StatsRecorder::default(),
            }),
            max_failures: max_failures.max(1),
            reset_timeout,
        }
    }

    pub fn enter(&self, now: Instant) -> EnterResult {
        let mut state = self.lock();

        match state.circuit {
            Circuit::Closed { .. } => {
                state.stats.record_admitted();
                EnterResult::Accepted {
                    mode: ExecutionMode::Normal,
                }
            }
            Circuit::Open { open_until } if now >= open_until => {
                state.circuit = Circuit::HalfOpen;
                state.stats.record_admitted();
                EnterResult::Accepted {
                    mode: ExecutionMode::Probe,
                }
            }
            Circuit::Open { .. } | Circuit::HalfOpen => {
                state.stats.record_rejected();
                EnterResult::Rejected
            }
        }
    }

    pub fn exit(&self, result: ExecutionResult, mode: ExecutionMode, now: Instant) -> ExitResult {
        let mut state = self.lock();

        match result {
            ExecutionResult::Success { latency } => state.stats.record_success(latency),
            ExecutionResult::Failure { qualifying } => state.stats.record_failure(qualifying),
            ExecutionResult::Timeout => state.stats.record_timeout(),
        }

        match state.circuit {
            Circuit::Closed { failures } if result.is_qualifying_failure() => {
                let failures = failures.saturating_add(1);

                if failures >= self.max_failures {
                    state.circuit = self.open_from(now);
                    ExitResult::Opened
                } else {
                    state.circuit = Circuit::Closed { failures };
                    ExitResult::Unchanged
                }
            }
            Circuit::Closed { .. } => {
                if matches!(result, ExecutionResult::Success { .. }) {
                    state.circuit = Circuit::Closed { failures: 0 };
                }

                ExitResult::Unchanged
            }
            Circuit::HalfOpen if mode == ExecutionMode::Probe => {
                if result.is_qualifying_failure() {
                    state.circuit = self.open_from(now);
                    ExitResult::Reopened
                } else {
                    state.circuit = Circuit::Closed { failures: 0 };
                    ExitResult::Closed
                }
            }
            // The call was admitted before the breaker opened (for example by a forced trip);
            // its result no longer says anything about the current circuit.
            Circuit::HalfOpen | Circuit::Open { .. } => ExitResult::Unchanged,
        }
    }

    /// Releases a call whose future was dropped before it completed.
    ///
    /// Returns `true` if an abandoned probe sent the breaker back to open.
    pub fn abandon(&self, mode: ExecutionMode, now: Instant) -> bool {
        let mut state = self.lock();
        state.stats.record_abandoned();

        if mode == ExecutionMode::Probe && matches!(state.circuit, Circuit::HalfOpen) {
            state.circuit = self.open_from(now);
            return true;
        }

        false
    }

    /// Opens the breaker unless it is already open. Returns `true` if a transition happened.
    pub fn force_open(&self, now: Instant) -> bool {
        let mut state = self.lock();

        if state.circuit.state(now) == CircuitState::Open {
            return false;
        }

        state.circuit = self.open_from(now);
        true
    }

    pub fn state(&self, now: Instant) -> CircuitState {
        self.lock().circuit.state(now)
    }

    pub fn is_closed(&self, now: Instant) -> bool {
        self.state(now) != CircuitState::Open
    }

    pub fn request_stats(&self) -> RequestStats {
        self.lock().stats.snapshot()
    }

    pub fn stats(&self, now: Instant) -> Stats {
        let state = self.lock();
        let circuit_state = state.circuit.state(now);

        Stats {
            requests: state.stats.snapshot(),
            breaker: BreakerStats {
                is_closed: circuit_state != CircuitState::Open,
                state: circuit_state,
            },
        }
    }

    fn open_from(&self, now: Instant) -> Circuit {
        Circuit::Open {
            open_until: now.checked_add(self.reset_timeout).unwrap_or(now),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().expect(ERR_POISONED_LOCK)
    }
}
