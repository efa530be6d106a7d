//! House-number range planning.
//!
//! Manual plans come straight from corrected user bounds. Auto plans center a
//! window on the house number nearest the street's geocenter, falling back to
//! fixed windows when detection fails.

use tracing::{debug, info, instrument, warn};

use crate::core::range::{DEFAULT_MAX, DEFAULT_MIN, centered_window, manual_window};
use crate::core::types::{GeocodeAnchor, RangeMode, RangePlan, StreetTarget, Window};
use crate::io::capabilities::NearestHouseNumberDetector;
use crate::io::config::SurveyConfig;

pub struct RangePlanner<'a, D: ?Sized> {
    detector: &'a D,
    radius: u32,
    fallback_windows: Vec<Window>,
}

impl<'a, D: NearestHouseNumberDetector + ?Sized> RangePlanner<'a, D> {
    pub fn new(detector: &'a D, radius: u32, fallback_windows: Vec<Window>) -> Self {
        Self {
            detector,
            radius,
            fallback_windows,
        }
    }

    pub fn from_config(detector: &'a D, config: &SurveyConfig) -> Self {
        Self::new(detector, config.planner.radius, config.fallback_windows())
    }

    /// Choose the window for this run. Never fails: detection problems
    /// degrade to the fallback plan.
    #[instrument(skip_all, fields(street = %target.label(), mode = ?mode))]
    pub fn plan(
        &self,
        anchor: &GeocodeAnchor,
        target: &StreetTarget,
        mode: RangeMode,
        manual_min: Option<i64>,
        manual_max: Option<i64>,
    ) -> RangePlan {
        let plan = match mode {
            RangeMode::Manual => RangePlan::manual(manual_window(manual_min, manual_max)),
            RangeMode::Auto => self.auto_plan(anchor, target),
        };
        info!(
            min = plan.min_number,
            max = plan.max_number,
            center = ?plan.center_number,
            fallback = plan.is_fallback(),
            "range planned"
        );
        plan
    }

    fn auto_plan(&self, anchor: &GeocodeAnchor, target: &StreetTarget) -> RangePlan {
        match self.detector.detect(
            anchor.center_location,
            &anchor.formatted_street_name,
            &target.suburb,
        ) {
            Ok(Some(center)) => {
                debug!(center, "nearest house number detected");
                RangePlan::centered(center, centered_window(center, self.radius))
            }
            Ok(None) => {
                debug!("no house number near center, using fallback windows");
                self.fallback_plan()
            }
            Err(err) => {
                warn!(%err, "house number detection failed, using fallback windows");
                self.fallback_plan()
            }
        }
    }

    fn fallback_plan(&self) -> RangePlan {
        let mut windows = self.fallback_windows.iter().copied();
        let first = windows.next().unwrap_or(Window {
            min: DEFAULT_MIN,
            max: DEFAULT_MAX,
        });
        RangePlan::fallback(first, windows.collect())
    }
}
