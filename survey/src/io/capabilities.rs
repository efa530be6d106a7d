//! Capability traits for every external collaborator the survey consumes.
//!
//! Orchestration code is generic over these traits so tests can substitute
//! scripted fakes (see `test_support`) for the Google Maps and classifier
//! backends.

use std::fmt;

use crate::core::types::{Classification, GeocodeAnchor, GeocodeMatch, LatLng, StreetTarget};

/// Failure reported by a capability call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    /// Timeout, rate limit, or server-side failure; the same call may succeed later.
    Transient(String),
    /// Malformed response, rejected request, or misconfiguration; retrying will not help.
    Terminal(String),
}

impl CapabilityError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        Self::Terminal(message.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl fmt::Display for CapabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient(msg) => write!(f, "transient failure: {msg}"),
            Self::Terminal(msg) => write!(f, "terminal failure: {msg}"),
        }
    }
}

impl std::error::Error for CapabilityError {}

pub type CapabilityResult<T> = Result<T, CapabilityError>;

/// Resolves a street to its canonical name and geocenter.
pub trait GeocodeAnchorResolver {
    /// `Ok(None)` when the geocoder does not know the street.
    fn resolve(&self, target: &StreetTarget) -> CapabilityResult<Option<GeocodeAnchor>>;
}

/// Finds the house number nearest to a point on a street.
pub trait NearestHouseNumberDetector {
    fn detect(
        &self,
        location: LatLng,
        street_name: &str,
        suburb: &str,
    ) -> CapabilityResult<Option<u32>>;
}

/// Forward-geocodes a single house number.
pub trait GeocodeProbe {
    /// `Ok(None)` for not found or ambiguous. Matches always report their precision tier.
    fn probe(
        &self,
        house_number: u32,
        street_name: &str,
        suburb: &str,
    ) -> CapabilityResult<Option<GeocodeMatch>>;
}

/// Retrieves overhead imagery centered on a location.
pub trait ImageFetcher {
    fn fetch(&self, location: LatLng) -> CapabilityResult<Vec<u8>>;
}

/// Rates the likelihood of a vegetable garden in an image.
pub trait GardenClassifier {
    fn classify(&self, image: &[u8], address_label: &str) -> CapabilityResult<Classification>;
}

impl<T: ImageFetcher + ?Sized> ImageFetcher for &T {
    fn fetch(&self, location: LatLng) -> CapabilityResult<Vec<u8>> {
        (**self).fetch(location)
    }
}

impl<T: GardenClassifier + ?Sized> GardenClassifier for &T {
    fn classify(&self, image: &[u8], address_label: &str) -> CapabilityResult<Classification> {
        (**self).classify(image, address_label)
    }
}
