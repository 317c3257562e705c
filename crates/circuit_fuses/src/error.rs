// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::time::Duration;

use thiserror::Error;

/// The error returned by a protected command call.
///
/// Every failure observed by a [`CircuitBreaker`][crate::breaker::CircuitBreaker] falls into one of
/// three categories:
///
/// - [`Rejected`][BreakerError::Rejected]: the breaker is open and the command was never invoked.
///   Rejections are never retried.
/// - [`Timeout`][BreakerError::Timeout]: the command did not complete before its deadline. Timeouts
///   always count toward the trip threshold.
/// - [`Command`][BreakerError::Command]: the command itself failed. The original error is carried
///   untouched; the breaker's error classifier only decides whether it counts toward the threshold.
///
/// # Thread safety
///
/// This type is thread-safe if `E` is.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BreakerError<E> {
    /// The breaker is open and rejected the call without invoking the command.
    #[error("circuit breaker '{name}' is open")]
    Rejected {
        /// Name of the breaker that rejected the call.
        name: Cow<'static, str>,
    },

    /// The command did not complete within the configured deadline.
    #[error("command timed out after {}ms", .timeout.as_millis())]
    Timeout {
        /// The deadline that elapsed.
        timeout: Duration,
    },

    /// The command failed with its own error.
    #[error("{0}")]
    Command(E),
}

impl<E> BreakerError<E> {
    /// Returns `true` if the call was rejected by an open breaker.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// Returns `true` if the command missed its deadline.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns the command's own error, if this is a command failure.
    #[must_use]
    pub fn as_command(&self) -> Option<&E> {
        match self {
            Self::Command(error) => Some(error),
            _ => None,
        }
    }

    /// Consumes the error and returns the command's own error, if this is a command failure.
    #[must_use]
    pub fn into_command(self) -> Option<E> {
        match self {
            Self::Command(error) => Some(error),
            _ => None,
        }
    }
}

/// A specialized `Result` for protected command calls.
pub type Result<T, E> = std::result::Result<T, BreakerError<E>>;

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    static_assertions::assert_impl_all!(BreakerError<String>: Send, Sync, std::error::Error);

    #[test]
    fn rejected_display_contains_name() {
        let error = BreakerError::<String>::Rejected { name: "payments".into() };

        assert_eq!(error.to_string(), "circuit breaker 'payments' is open");
        assert!(error.is_rejected());
        assert!(!error.is_timeout());
        assert!(error.as_command().is_none());
    }

    #[test]
    fn timeout_display_contains_deadline() {
        let error = BreakerError::<String>::Timeout {
            timeout: Duration::from_millis(250),
        };

        assert_eq!(error.to_string(), "command timed out after 250ms");
        assert!(error.is_timeout());
        assert!(!error.is_rejected());
        assert!(error.into_command().is_none());
    }

    #[test]
    fn command_error_is_passed_through_verbatim() {
        let error = BreakerError::Command("connection reset".to_string());

        assert_eq!(error.to_string(), "connection reset");
        assert_eq!(error.as_command().map(String::as_str), Some("connection reset"));
        assert_eq!(error.into_command(), Some("connection reset".to_string()));
    }
}
