//! Deterministic window arithmetic for range planning.
//!
//! Manual bounds are corrected rather than rejected: a malformed bound never
//! aborts a run.

use tracing::debug;

use crate::core::types::Window;

/// Default manual lower bound.
pub const DEFAULT_MIN: u32 = 1;
/// Default manual upper bound.
pub const DEFAULT_MAX: u32 = 200;
/// Default half-width of the auto window around a detected center.
pub const DEFAULT_RADIUS: u32 = 200;

/// `[max(1, center - radius), center + radius]`.
pub fn centered_window(center: u32, radius: u32) -> Window {
    Window {
        min: center.saturating_sub(radius).max(1),
        max: center.saturating_add(radius).max(1),
    }
}

/// Correct user-supplied manual bounds into a valid window.
///
/// - missing or `< 1` min -> [`DEFAULT_MIN`]
/// - missing or `< 1` max -> [`DEFAULT_MAX`]
/// - `max < min` after correction -> max falls back to [`DEFAULT_MAX`]; if
///   that is still below min, min falls back to [`DEFAULT_MIN`]
pub fn manual_window(min: Option<i64>, max: Option<i64>) -> Window {
    let min_number = bound_or(min, DEFAULT_MIN);
    let mut max_number = bound_or(max, DEFAULT_MAX);
    if max_number >= min_number {
        return Window {
            min: min_number,
            max: max_number,
        };
    }

    debug!(min_number, max_number, "manual max below min, using default max");
    max_number = DEFAULT_MAX;
    if max_number >= min_number {
        return Window {
            min: min_number,
            max: max_number,
        };
    }
    debug!(min_number, "manual min above default max, using default min");
    Window {
        min: DEFAULT_MIN,
        max: max_number,
    }
}

fn bound_or(raw: Option<i64>, default: u32) -> u32 {
    match raw {
        Some(value) if value >= 1 => u32::try_from(value).unwrap_or_else(|_| {
            debug!(value, clamped = u32::MAX, "manual bound too large, clamping");
            u32::MAX
        }),
        Some(value) => {
            debug!(value, default, "invalid manual bound, using default");
            default
        }
        None => default,
    }
}
