//! Minimum-interval rate limiting for outbound capability calls.

use std::cell::Cell;
use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;

/// Enforces a fixed minimum delay between consecutive calls.
///
/// The first call never waits. Interior mutability keeps call sites on
/// `&self` so a limiter can live next to the capability it guards.
#[derive(Debug)]
pub struct RateLimiter {
    label: &'static str,
    min_interval: Duration,
    last_call: Cell<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(label: &'static str, min_interval: Duration) -> Self {
        Self {
            label,
            min_interval,
            last_call: Cell::new(None),
        }
    }

    /// Sleep until `min_interval` has elapsed since the previous call, then
    /// record this call. Returns how long it slept.
    pub fn wait_if_needed(&self) -> Duration {
        let now = Instant::now();
        let waited = match self.last_call.get() {
            Some(last) => {
                let ready_at = last + self.min_interval;
                let wait = ready_at.saturating_duration_since(now);
                if !wait.is_zero() {
                    trace!(limiter = self.label, wait_ms = wait.as_millis() as u64, "rate limiting");
                    thread::sleep(wait);
                }
                wait
            }
            None => Duration::ZERO,
        };
        self.last_call.set(Some(Instant::now()));
        waited
    }
}
