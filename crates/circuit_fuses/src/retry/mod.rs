// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Retrying calls through a circuit breaker.
//!
//! A [`RetryController`] owns a [`CircuitBreaker`][crate::CircuitBreaker] and re-runs failed
//! calls with exponential backoff. It stops as soon as the breaker opens, so a tripped breaker is
//! never hammered with retries that are bound to be rejected.

mod backoff;
mod builder;
mod constants;
mod options;
mod service;

pub use builder::RetryControllerBuilder;
pub use options::RetryOptions;
pub use service::RetryController;
