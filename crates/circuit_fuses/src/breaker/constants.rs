// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// Default per-call deadline for the protected command.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of qualifying failures in a row before the breaker trips.
pub(crate) const DEFAULT_MAX_FAILURES: u32 = 5;

/// Default duration the breaker stays open before admitting a probe call.
pub(crate) const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_millis(50);

pub(crate) const ERR_POISONED_LOCK: &str = "poisoned lock - breaker state can no longer be trusted";
