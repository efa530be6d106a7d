//! Bounded exponential backoff applied at the capability-call boundary.

use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::io::capabilities::{CapabilityError, CapabilityResult};
use crate::io::rate_limit::RateLimiter;

/// Tagged result of a retried call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome<T> {
    Ok(T),
    /// Every attempt failed transiently and the attempt cap was reached.
    TransientFailure {
        attempts: u32,
        error: CapabilityError,
    },
    /// A non-retryable failure ended the call early.
    TerminalFailure {
        attempts: u32,
        error: CapabilityError,
    },
}

impl<T> CallOutcome<T> {
    /// Human-readable reason for a failed outcome.
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            Self::Ok(_) => None,
            Self::TransientFailure { attempts, error } => {
                Some(format!("gave up after {attempts} attempts: {error}"))
            }
            Self::TerminalFailure { error, .. } => Some(error.to_string()),
        }
    }
}

/// Retry transient failures up to `max_attempts` total attempts, sleeping
/// `base_delay * 2^(n-1)` (capped at `max_delay`) after the n-th failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `failed_attempt`-th failure (1-indexed).
    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `call` under this policy. `limiter`, when given, is waited before
    /// every attempt, retries included.
    pub fn run<T, F>(&self, label: &str, limiter: Option<&RateLimiter>, mut call: F) -> CallOutcome<T>
    where
        F: FnMut() -> CapabilityResult<T>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            if let Some(limiter) = limiter {
                limiter.wait_if_needed();
            }
            match call() {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(call = label, attempt, "succeeded after retry");
                    }
                    return CallOutcome::Ok(value);
                }
                Err(error) if !error.is_transient() => {
                    warn!(call = label, attempt, %error, "terminal failure");
                    return CallOutcome::TerminalFailure {
                        attempts: attempt,
                        error,
                    };
                }
                Err(error) if attempt >= max_attempts => {
                    warn!(call = label, attempt, %error, "retries exhausted");
                    return CallOutcome::TransientFailure {
                        attempts: attempt,
                        error,
                    };
                }
                Err(error) => {
                    let delay = self.backoff(attempt);
                    debug!(call = label, attempt, delay_ms = delay.as_millis() as u64, %error, "transient failure, backing off");
                    thread::sleep(delay);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
        assert_eq!(policy.backoff(40), Duration::from_millis(350));
    }

    #[test]
    fn retries_transient_until_success() {
        let mut calls = 0;
        let outcome = fast_policy(3).run("test", None, || {
            calls += 1;
            if calls < 3 {
                Err(CapabilityError::transient("HTTP 503"))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(outcome, CallOutcome::Ok(3));
    }

    #[test]
    fn gives_up_after_attempt_cap() {
        let mut calls = 0;
        let outcome: CallOutcome<()> = fast_policy(2).run("test", None, || {
            calls += 1;
            Err(CapabilityError::transient("timeout"))
        });
        assert_eq!(calls, 2);
        assert_eq!(
            outcome,
            CallOutcome::TransientFailure {
                attempts: 2,
                error: CapabilityError::transient("timeout"),
            }
        );
        assert!(
            outcome
                .failure_reason()
                .is_some_and(|r| r.contains("gave up after 2 attempts"))
        );
    }

    #[test]
    fn terminal_failure_is_not_retried() {
        let mut calls = 0;
        let outcome: CallOutcome<()> = fast_policy(5).run("test", None, || {
            calls += 1;
            Err(CapabilityError::terminal("malformed response"))
        });
        assert_eq!(calls, 1);
        assert!(matches!(
            outcome,
            CallOutcome::TerminalFailure { attempts: 1, .. }
        ));
    }

    #[test]
    fn limiter_is_consulted_per_attempt() {
        let limiter = RateLimiter::new("test", Duration::from_millis(10));
        let start = std::time::Instant::now();
        let _: CallOutcome<()> = fast_policy(3).run("test", Some(&limiter), || {
            Err(CapabilityError::transient("busy"))
        });
        assert!(start.elapsed() >= Duration::from_millis(15));
    }
}
