//! Deterministic probe order for a [`RangePlan`].
//!
//! - Manual plans: ascending.
//! - Auto plans with a detected center: nearest-first. Offsets run
//!   `0, +1, -1, +2, -2, ...`, so the center's own side of the street
//!   (`0, ±2, ±4`) interleaves with the opposite side (`±1, ±3`). Numbers
//!   outside the window are skipped.
//! - Auto fallback plans: the first window ascending, then each spillover
//!   window ascending, skipping numbers already listed.

use std::iter;

use crate::core::types::{RangeMode, RangePlan, Window};

/// Lazily generated house numbers. Nothing is materialized up front, so a
/// window spanning the whole `u32` range costs nothing until it is pulled.
pub type CandidateOrder = Box<dyn Iterator<Item = u32>>;

/// Ordered house numbers for `plan`. Same plan, same order.
pub fn candidate_order(plan: &RangePlan) -> CandidateOrder {
    let window = plan.window();
    match (plan.mode, plan.center_number) {
        (RangeMode::Auto, Some(center)) if window.contains(center) => {
            Box::new(nearest_first(center, window))
        }
        (RangeMode::Auto, None) => Box::new(with_spillover(window, plan.spillover.clone())),
        _ => Box::new(ascending(window)),
    }
}

fn ascending(window: Window) -> impl Iterator<Item = u32> {
    window.min..=window.max
}

fn nearest_first(center: u32, window: Window) -> impl Iterator<Item = u32> {
    let reach = (window.max - center).max(center - window.min);
    let around = (1..=reach).flat_map(move |offset| {
        [center.checked_add(offset), center.checked_sub(offset)]
            .into_iter()
            .flatten()
            .filter(move |n| window.contains(*n))
    });
    iter::once(center).chain(around)
}

/// Each window ascending, skipping numbers covered by an earlier window.
fn with_spillover(first: Window, spillover: Vec<Window>) -> impl Iterator<Item = u32> {
    let mut windows = spillover;
    windows.insert(0, first);
    (0..windows.len()).flat_map(move |idx| {
        let earlier = windows[..idx].to_vec();
        ascending(windows[idx]).filter(move |n| !earlier.iter().any(|w| w.contains(*n)))
    })
}
