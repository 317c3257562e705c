// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::fmt::Display;
use std::sync::Weak;
use std::time::SystemTime;

use crate::utils::define_fn_wrapper;

/// Why a breaker tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum TripReason {
    /// The number of consecutive qualifying failures reached `max_failures`.
    FailureThreshold,

    /// The probe call admitted after the reset timeout failed.
    ProbeFailed,

    /// The breaker was opened through `force_open`, for example by a [`FuseBox`][crate::FuseBox].
    Forced,
}

impl TripReason {
    /// Returns a short `snake_case` name of the reason, as used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FailureThreshold => "failure_threshold",
            Self::ProbeFailed => "probe_failed",
            Self::Forced => "forced",
        }
    }
}

impl Display for TripReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification delivered to trip listeners whenever a breaker opens.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct TripEvent {
    /// Name of the breaker that opened.
    pub name: Cow<'static, str>,
    /// Wall-clock time of the transition.
    pub tripped_at: SystemTime,
    /// What caused the transition.
    pub reason: TripReason,
}

define_fn_wrapper!(OnTrip(Fn(event: &TripEvent) -> ()));

/// Receiver of trip notifications whose lifetime is independent of the breaker.
pub(crate) trait TripSink: Send + Sync {
    fn tripped(&self, event: &TripEvent);
}

/// A trip listener registered on a breaker.
#[derive(Debug, Clone)]
pub(crate) enum Listener {
    /// Lives as long as the breaker.
    Callback(OnTrip),

    /// Removed from the breaker once its sink is dropped.
    Sink(Weak<dyn TripSink>),
}

impl Listener {
    pub fn is_alive(&self) -> bool {
        match self {
            Self::Callback(_) => true,
            Self::Sink(sink) => sink.strong_count() > 0,
        }
    }

    pub fn is_sink(&self, sink: &Weak<dyn TripSink>) -> bool {
        matches!(self, Self::Sink(registered) if Weak::ptr_eq(registered, sink))
    }

    pub fn notify(&self, event: &TripEvent) {
        match self {
            Self::Callback(on_trip) => on_trip.call(event),
            Self::Sink(sink) => {
                if let Some(sink) = sink.upgrade() {
                    sink.tripped(event);
                }
            }
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn reason_names() {
        assert_eq!(TripReason::FailureThreshold.to_string(), "failure_threshold");
        assert_eq!(TripReason::ProbeFailed.to_string(), "probe_failed");
        assert_eq!(TripReason::Forced.as_str(), "forced");
    }

    #[test]
    fn on_trip_receives_event() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let on_trip = OnTrip::new(move |event: &TripEvent| {
            assert_eq!(event.name, "db");
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        on_trip.call(&TripEvent {
            name: "db".into(),
            tripped_at: SystemTime::UNIX_EPOCH,
            reason: TripReason::Forced,
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    struct Counter(AtomicUsize);

    impl TripSink for Counter {
        fn tripped(&self, _event: &TripEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn sink_listener_dies_with_its_sink() {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let weak = Arc::downgrade(&counter);
        let weak: Weak<dyn TripSink> = weak;
        let listener = Listener::Sink(weak.clone());
        let event = TripEvent {
            name: "db".into(),
            tripped_at: SystemTime::UNIX_EPOCH,
            reason: TripReason::Forced,
        };

        assert!(listener.is_alive());
        assert!(listener.is_sink(&weak));
        listener.notify(&event);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        drop(counter);

        assert!(!listener.is_alive());
        listener.notify(&event);
        assert!(Listener::Callback(OnTrip::new(|_: &TripEvent| {})).is_alive());
    }
}
