//! Shared deterministic types for the survey core.
//!
//! These types define stable contracts between the planner, enumerator,
//! pipeline, and result store. They carry no I/O and serialize to the
//! persisted store format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::street::street_key;

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Shift both components by the same offset (used when probing near a point).
    pub fn offset(self, delta: f64) -> Self {
        Self {
            lat: self.lat + delta,
            lng: self.lng + delta,
        }
    }
}

/// The street a survey run targets. Immutable user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreetTarget {
    pub street_name: String,
    pub suburb: String,
}

impl StreetTarget {
    pub fn new(street_name: impl Into<String>, suburb: impl Into<String>) -> Self {
        Self {
            street_name: street_name.into().trim().to_string(),
            suburb: suburb.into().trim().to_string(),
        }
    }

    /// Filesystem-safe key scoping persisted state to this street.
    pub fn street_key(&self) -> String {
        street_key(&self.street_name, &self.suburb)
    }

    /// Human-readable label, e.g. `Elm St, Springfield`.
    pub fn label(&self) -> String {
        format!("{}, {}", self.street_name, self.suburb)
    }
}

/// Canonical street resolved once per run.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeAnchor {
    pub formatted_street_name: String,
    pub center_location: LatLng,
}

/// How the house-number window was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeMode {
    Auto,
    Manual,
}

/// Inclusive house-number window. `min >= 1` and `max >= min` always hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub min: u32,
    pub max: u32,
}

impl Window {
    /// Build a window, returning `None` when the bounds violate the invariants.
    pub fn new(min: u32, max: u32) -> Option<Self> {
        (min >= 1 && max >= min).then_some(Self { min, max })
    }

    pub fn contains(&self, number: u32) -> bool {
        (self.min..=self.max).contains(&number)
    }
}

/// The house numbers a run will probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangePlan {
    pub mode: RangeMode,
    pub min_number: u32,
    pub max_number: u32,
    /// Detected nearest house number; set only for auto plans whose detection succeeded.
    pub center_number: Option<u32>,
    /// Remaining fallback windows, visited in order after the primary window
    /// is exhausted. Empty unless the plan is an auto fallback.
    pub spillover: Vec<Window>,
}

impl RangePlan {
    pub fn manual(window: Window) -> Self {
        Self {
            mode: RangeMode::Manual,
            min_number: window.min,
            max_number: window.max,
            center_number: None,
            spillover: Vec::new(),
        }
    }

    pub fn centered(center: u32, window: Window) -> Self {
        Self {
            mode: RangeMode::Auto,
            min_number: window.min,
            max_number: window.max,
            center_number: Some(center),
            spillover: Vec::new(),
        }
    }

    pub fn fallback(first: Window, spillover: Vec<Window>) -> Self {
        Self {
            mode: RangeMode::Auto,
            min_number: first.min,
            max_number: first.max,
            center_number: None,
            spillover,
        }
    }

    pub fn window(&self) -> Window {
        Window {
            min: self.min_number,
            max: self.max_number,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.mode == RangeMode::Auto && self.center_number.is_none()
    }
}

/// Geocoder match quality, strictest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrecisionTier {
    Rooftop,
    RangeInterpolated,
    GeometricCenter,
    Approximate,
}

impl PrecisionTier {
    /// Parse a geocoder `location_type` value. Unknown values map to `Approximate`.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "ROOFTOP" => Self::Rooftop,
            "RANGE_INTERPOLATED" => Self::RangeInterpolated,
            "GEOMETRIC_CENTER" => Self::GeometricCenter,
            _ => Self::Approximate,
        }
    }
}

/// Raw answer from a geocode probe, before the enumerator filters it.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeMatch {
    pub formatted_address: String,
    pub location: LatLng,
    pub precision: PrecisionTier,
    /// False when the geocoder tags the result as a business or landmark.
    pub residential: bool,
}

/// A house number verified at rooftop precision on the target street.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmedAddress {
    pub formatted_address: String,
    pub location: LatLng,
    pub precision_tier: PrecisionTier,
}

/// Garden likelihood recorded per address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Likelihood {
    Low,
    Medium,
    High,
    /// Classification was attempted and failed terminally.
    Unknown,
}

impl Likelihood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Unknown => "unknown",
        }
    }
}

/// Output of the garden classifier for one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub likelihood: Likelihood,
    pub reasoning: String,
}

/// One persisted row of the result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedResult {
    pub address: String,
    pub garden_likelihood: Likelihood,
    pub classified_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LatLng>,
}

impl ProcessedResult {
    pub fn classified(
        address: &ConfirmedAddress,
        classification: Classification,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            address: address.formatted_address.clone(),
            garden_likelihood: classification.likelihood,
            classified_at: at,
            reasoning: Some(classification.reasoning),
            location: Some(address.location),
        }
    }

    pub fn unknown(address: &ConfirmedAddress, reason: String, at: DateTime<Utc>) -> Self {
        Self {
            address: address.formatted_address.clone(),
            garden_likelihood: Likelihood::Unknown,
            classified_at: at,
            reasoning: Some(reason),
            location: Some(address.location),
        }
    }
}
