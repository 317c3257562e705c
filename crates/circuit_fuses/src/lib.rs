// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Circuit breakers, retries with exponential backoff, and fuse boxes for async commands.
//!
//! A command is anything implementing [`layered::Service`] with a `Result` output, such as an
//! async closure wrapped in [`layered::Execute`]. This crate protects such commands in three
//! layers:
//!
//! - [`CircuitBreaker`] enforces a per-call deadline, counts failures, and stops calling the
//!   command once too many calls in a row have failed. After a reset timeout it lets a single
//!   probe call through to find out whether the command recovered.
//! - [`RetryController`] retries failed calls through a breaker with exponential backoff, and
//!   gives up as soon as the breaker opens.
//! - [`FuseBox`] ties breakers together so that when one of them trips, all of them open.
//!
//! # Quick Start
//!
//! ```rust
//! use std::time::Duration;
//!
//! use layered::Execute;
//! use tick::Clock;
//!
//! use circuit_fuses::{FuseBox, RetryController};
//!
//! # async fn example(clock: Clock) {
//! let fetch_user = RetryController::builder("fetch_user", &clock)
//!     .timeout(Duration::from_secs(2))
//!     .max_failures(3)
//!     .retries(2)
//!     .min_timeout(Duration::from_millis(200))
//!     .build(Execute::new(|id: u64| async move { Ok::<_, String>(format!("user {id}")) }));
//!
//! let fetch_orders = RetryController::builder("fetch_orders", &clock)
//!     .build(Execute::new(|id: u64| async move { Ok::<_, String>(vec![id]) }));
//!
//! // Both calls hit the same backend: once one gives up, so does the other.
//! let fuse_box = FuseBox::new();
//! fuse_box.add_fuse(&fetch_user);
//! fuse_box.add_fuse(&fetch_orders);
//!
//! let user = fetch_user.run_command(42).await;
//! # }
//! ```
//!
//! # Errors
//!
//! Every failure is reported as a [`BreakerError`]: the breaker was open, the command timed out,
//! or the command failed with its own error, which is passed through unchanged.
//!
//! # Time
//!
//! All timing goes through [`tick::Clock`]. Use `Clock::new_tokio()` (with `tick`'s `tokio`
//! feature) in production, and `tick::ClockControl` to drive time by hand in tests.
//!
//! # Features
//!
//! - `tokio`: enables `RetryController::run_command_with_callback`, which spawns the retry loop
//!   on the Tokio runtime.
//! - `serde`: (de)serialization of [`BreakerOptions`] and [`RetryOptions`].
//! - `metrics`: reports breaker and retry events to an OpenTelemetry `resilience.event` counter.
//!
//! # Logging
//!
//! Trips, state changes, rejections and retries are emitted as [`tracing`] events named
//! `circuit_fuses.*`, carrying the breaker name as `breaker.name`.

pub mod breaker;
mod error;
pub mod fuse_box;
pub mod retry;
pub mod stats;

mod telemetry;
mod utils;

#[cfg(feature = "serde")]
mod serde_millis;

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
pub(crate) mod testing;

#[doc(inline)]
pub use breaker::{BreakerBuilder, BreakerHandle, BreakerOptions, CircuitBreaker, CircuitState, TripEvent, TripReason};
pub use error::{BreakerError, Result};
#[doc(inline)]
pub use fuse_box::FuseBox;
#[doc(inline)]
pub use retry::{RetryController, RetryControllerBuilder, RetryOptions};
#[doc(inline)]
pub use stats::{BreakerStats, RequestStats, Stats};
