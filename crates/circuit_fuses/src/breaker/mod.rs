// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Circuit breakers.
//!
//! A [`CircuitBreaker`] wraps a command (any [`layered::Service`] returning a `Result`) and tracks
//! how its calls turn out:
//!
//! ```text
//!            max_failures qualifying failures in a row, or force_open
//!   Closed ─────────────────────────────────────────────────────────▶ Open
//!     ▲                                                                │
//!     │ probe succeeds                            reset_timeout elapses│
//!     │                                                                ▼
//!     └───────────────────────────────────────────────────────────  HalfOpen
//!                          probe fails: back to Open, timer restarts
//! ```
//!
//! While open, calls fail with [`BreakerError::Rejected`][crate::BreakerError::Rejected] without
//! reaching the command. Once the reset timeout elapses a single probe call is let through;
//! other calls keep being rejected until it completes.
//!
//! Every transition to open notifies the breaker's trip listeners with a [`TripEvent`]. A
//! [`FuseBox`][crate::FuseBox] uses these notifications to open a whole group of breakers together.

mod builder;
mod constants;
mod engine;
mod handle;
mod inner;
mod options;
mod service;
mod state;
mod trip;

pub use builder::BreakerBuilder;
pub use handle::BreakerHandle;
pub(crate) use inner::BreakerCore;
pub use options::BreakerOptions;
pub use service::CircuitBreaker;
pub use state::CircuitState;
pub use trip::{TripEvent, TripReason};
pub(crate) use trip::{Listener, OnTrip, TripSink};
