//! Test-only fixtures and scripted capability fakes.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};

use crate::core::street::leading_house_number;
use crate::core::types::{
    Classification, ConfirmedAddress, GeocodeAnchor, GeocodeMatch, LatLng, Likelihood,
    PrecisionTier, ProcessedResult, StreetTarget,
};
use crate::io::capabilities::{
    CapabilityError, CapabilityResult, GardenClassifier, GeocodeAnchorResolver, GeocodeProbe,
    ImageFetcher, NearestHouseNumberDetector,
};
use crate::io::config::{RateLimitConfig, RetryConfig, SurveyConfig};

/// Fixed timestamp used by every fixture.
pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// A stored result with a deterministic timestamp and no optional fields.
pub fn processed(address: &str, likelihood: Likelihood) -> ProcessedResult {
    ProcessedResult {
        address: address.to_string(),
        garden_likelihood: likelihood,
        classified_at: fixed_time(),
        reasoning: None,
        location: None,
    }
}

/// Deterministic location derived from the address's house number.
pub fn location_for(address: &str) -> LatLng {
    let number = leading_house_number(address).unwrap_or(0);
    LatLng::new(-37.0 - f64::from(number) / 10_000.0, 144.0)
}

/// A rooftop-confirmed address.
pub fn confirmed(address: &str) -> ConfirmedAddress {
    ConfirmedAddress {
        formatted_address: address.to_string(),
        location: location_for(address),
        precision_tier: PrecisionTier::Rooftop,
    }
}

/// Anchor for `Elm St` used across tests.
pub fn elm_anchor() -> GeocodeAnchor {
    GeocodeAnchor {
        formatted_street_name: "Elm St".to_string(),
        center_location: LatLng::new(-37.0, 144.0),
    }
}

pub fn elm_target() -> StreetTarget {
    StreetTarget::new("Elm St", "Springfield")
}

/// Default config with every delay zeroed and `data_dir` pointed at `data_dir`.
pub fn fast_config(data_dir: &Path) -> SurveyConfig {
    SurveyConfig {
        data_dir: data_dir.to_path_buf(),
        rate_limit: RateLimitConfig {
            probe_delay_ms: 0,
            image_delay_ms: 0,
            classify_delay_ms: 0,
        },
        retry: RetryConfig {
            max_attempts: 3,
            base_delay_ms: 0,
            max_delay_ms: 0,
        },
        ..SurveyConfig::default()
    }
}

/// Resolver returning one scripted answer.
#[derive(Debug, Clone)]
pub struct ScriptedResolver {
    result: CapabilityResult<Option<GeocodeAnchor>>,
}

impl ScriptedResolver {
    pub fn found(anchor: GeocodeAnchor) -> Self {
        Self {
            result: Ok(Some(anchor)),
        }
    }

    pub fn not_found() -> Self {
        Self { result: Ok(None) }
    }

    pub fn failing(error: CapabilityError) -> Self {
        Self { result: Err(error) }
    }
}

impl GeocodeAnchorResolver for ScriptedResolver {
    fn resolve(&self, _target: &StreetTarget) -> CapabilityResult<Option<GeocodeAnchor>> {
        self.result.clone()
    }
}

/// Detector returning one scripted answer and counting calls.
#[derive(Debug)]
pub struct ScriptedDetector {
    result: CapabilityResult<Option<u32>>,
    calls: Cell<u32>,
}

impl ScriptedDetector {
    pub fn found(number: u32) -> Self {
        Self::with_result(Ok(Some(number)))
    }

    pub fn not_found() -> Self {
        Self::with_result(Ok(None))
    }

    pub fn failing(error: CapabilityError) -> Self {
        Self::with_result(Err(error))
    }

    fn with_result(result: CapabilityResult<Option<u32>>) -> Self {
        Self {
            result,
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.get()
    }
}

impl NearestHouseNumberDetector for ScriptedDetector {
    fn detect(
        &self,
        _location: LatLng,
        _street_name: &str,
        _suburb: &str,
    ) -> CapabilityResult<Option<u32>> {
        self.calls.set(self.calls.get() + 1);
        self.result.clone()
    }
}

/// Probe answering from a per-number script. Unscripted numbers are non-matches.
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    answers: HashMap<u32, CapabilityResult<Option<GeocodeMatch>>>,
    probed: RefCell<Vec<u32>>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rooftop residential houses at `numbers`, formatted `"<n> <street>"`.
    pub fn houses(numbers: impl IntoIterator<Item = u32>, street: &str) -> Self {
        numbers.into_iter().fold(Self::new(), |probe, number| {
            probe.rooftop(number, &format!("{number} {street}"))
        })
    }

    pub fn rooftop(self, number: u32, formatted_address: &str) -> Self {
        self.answer(number, Ok(Some(geocode_match(formatted_address))))
    }

    pub fn answer(mut self, number: u32, result: CapabilityResult<Option<GeocodeMatch>>) -> Self {
        self.answers.insert(number, result);
        self
    }

    /// Numbers probed so far, in call order.
    pub fn probed(&self) -> Vec<u32> {
        self.probed.borrow().clone()
    }
}

impl GeocodeProbe for ScriptedProbe {
    fn probe(
        &self,
        house_number: u32,
        _street_name: &str,
        _suburb: &str,
    ) -> CapabilityResult<Option<GeocodeMatch>> {
        self.probed.borrow_mut().push(house_number);
        self.answers.get(&house_number).cloned().unwrap_or(Ok(None))
    }
}

/// A rooftop residential match for `formatted_address`.
pub fn geocode_match(formatted_address: &str) -> GeocodeMatch {
    GeocodeMatch {
        formatted_address: formatted_address.to_string(),
        location: location_for(formatted_address),
        precision: PrecisionTier::Rooftop,
        residential: true,
    }
}

/// Image fetcher returning deterministic bytes per location.
///
/// Queued failures are returned first, one per call. Locations registered with
/// [`ScriptedImageFetcher::fail_at`] always fail.
#[derive(Debug, Default)]
pub struct ScriptedImageFetcher {
    queued_failures: RefCell<VecDeque<CapabilityError>>,
    failing_locations: Vec<(LatLng, CapabilityError)>,
    calls: RefCell<Vec<LatLng>>,
}

impl ScriptedImageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_fail(self, error: CapabilityError) -> Self {
        self.queued_failures.borrow_mut().push_back(error);
        self
    }

    pub fn fail_at(mut self, location: LatLng, error: CapabilityError) -> Self {
        self.failing_locations.push((location, error));
        self
    }

    pub fn calls(&self) -> Vec<LatLng> {
        self.calls.borrow().clone()
    }
}

impl ImageFetcher for ScriptedImageFetcher {
    fn fetch(&self, location: LatLng) -> CapabilityResult<Vec<u8>> {
        self.calls.borrow_mut().push(location);
        if let Some(error) = self.queued_failures.borrow_mut().pop_front() {
            return Err(error);
        }
        if let Some((_, error)) = self
            .failing_locations
            .iter()
            .find(|(failing, _)| *failing == location)
        {
            return Err(error.clone());
        }
        Ok(format!("image:{},{}", location.lat, location.lng).into_bytes())
    }
}

/// Classifier answering from a per-address script.
///
/// Each address consumes its queued answers in order; once exhausted (or if
/// never scripted) it answers `low`.
#[derive(Debug, Default)]
pub struct ScriptedClassifier {
    scripts: RefCell<HashMap<String, VecDeque<CapabilityResult<Classification>>>>,
    calls: RefCell<Vec<String>>,
}

impl ScriptedClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn likelihood(self, address: &str, likelihood: Likelihood) -> Self {
        self.respond(address, vec![Ok(classification(likelihood))])
    }

    pub fn respond(self, address: &str, answers: Vec<CapabilityResult<Classification>>) -> Self {
        self.scripts
            .borrow_mut()
            .entry(address.to_string())
            .or_default()
            .extend(answers);
        self
    }

    /// Address labels classified so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl GardenClassifier for ScriptedClassifier {
    fn classify(&self, _image: &[u8], address_label: &str) -> CapabilityResult<Classification> {
        self.calls.borrow_mut().push(address_label.to_string());
        self.scripts
            .borrow_mut()
            .get_mut(address_label)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(classification(Likelihood::Low)))
    }
}

pub fn classification(likelihood: Likelihood) -> Classification {
    Classification {
        likelihood,
        reasoning: format!("scripted {}", likelihood.as_str()),
    }
}
