// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

mod define_fn_wrapper;
pub(crate) use define_fn_wrapper::define_fn_wrapper;

mod rnd;
pub(crate) use rnd::Rnd;

use std::time::Duration;

/// Converts fractional seconds into a [`Duration`], clamping negative values to zero and
/// saturating on overflow.
pub(crate) fn secs_to_duration_saturating(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }

    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}
