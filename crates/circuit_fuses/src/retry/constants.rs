// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// Default number of retries after the first attempt.
pub(crate) const DEFAULT_RETRIES: u32 = 5;

/// Default growth factor applied to the backoff delay after every retry.
pub(crate) const DEFAULT_FACTOR: f64 = 2.0;

/// Delay before the first retry.
pub(crate) const DEFAULT_MIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Backoff delays are not capped unless configured.
pub(crate) const DEFAULT_MAX_TIMEOUT: Option<Duration> = None;

pub(crate) const DEFAULT_RANDOMIZE: bool = false;
