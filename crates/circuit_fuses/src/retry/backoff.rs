// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::cmp::min;
use std::time::Duration;

use super::RetryOptions;
use crate::utils::{Rnd, secs_to_duration_saturating};

/// Computes the delays inserted between attempts.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    min_timeout: Duration,
    max_timeout: Option<Duration>,
    factor: f64,
    randomize: bool,
    rnd: Rnd,
}

impl Backoff {
    pub fn new(options: &RetryOptions, rnd: Rnd) -> Self {
        Self {
            min_timeout: options.get_min_timeout(),
            max_timeout: options.get_max_timeout(),
            factor: options.get_factor(),
            randomize: options.get_randomize(),
            rnd,
        }
    }

    /// Returns an endless iterator of delays, one per retry.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + Send + use<> {
        DelaysIter {
            backoff: self.clone(),
            attempt: 0,
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        let random = if self.randomize { 1.0 + self.rnd.next_f64() } else { 1.0 };
        let growth = self.factor.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
        let delay = secs_to_duration_saturating(random * self.min_timeout.as_secs_f64() * growth);

        self.max_timeout.map_or(delay, |max| min(delay, max))
    }
}

#[derive(Debug)]
struct DelaysIter {
    backoff: Backoff,
    attempt: u32,
}

impl Iterator for DelaysIter {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        let delay = self.backoff.delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        Some(delay)
    }
}
