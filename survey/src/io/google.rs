//! Google Maps backends: geocoding, nearest-number detection, and Static Maps imagery.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::core::street::leading_house_number;
use crate::core::types::{GeocodeAnchor, GeocodeMatch, LatLng, PrecisionTier, StreetTarget};
use crate::io::capabilities::{
    CapabilityError, CapabilityResult, GeocodeAnchorResolver, GeocodeProbe, ImageFetcher,
    NearestHouseNumberDetector,
};
use crate::io::config::GoogleConfig;
use crate::io::rate_limit::RateLimiter;

/// Points tried around the street center when the center itself has no address.
const DETECT_OFFSETS: [f64; 4] = [0.0001, -0.0001, 0.0002, -0.0002];

/// Result types that mark a business or landmark rather than a dwelling.
const NON_RESIDENTIAL_TYPES: &[&str] = &[
    "airport",
    "amusement_park",
    "bakery",
    "bank",
    "bar",
    "bus_station",
    "cafe",
    "car_dealer",
    "car_repair",
    "cemetery",
    "church",
    "city_hall",
    "convenience_store",
    "courthouse",
    "dentist",
    "doctor",
    "establishment",
    "fire_station",
    "gas_station",
    "gym",
    "hospital",
    "library",
    "local_government_office",
    "lodging",
    "mosque",
    "museum",
    "park",
    "parking",
    "pharmacy",
    "point_of_interest",
    "police",
    "post_office",
    "primary_school",
    "restaurant",
    "school",
    "secondary_school",
    "shopping_mall",
    "stadium",
    "storage",
    "store",
    "supermarket",
    "synagogue",
    "train_station",
    "transit_station",
    "university",
    "zoo",
];

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeocodeResult {
    formatted_address: String,
    #[serde(default)]
    types: Vec<String>,
    #[serde(default)]
    address_components: Vec<AddressComponent>,
    geometry: Geometry,
    /// Set when the geocoder could only match part of the query.
    #[serde(default)]
    partial_match: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct AddressComponent {
    long_name: String,
    #[serde(default)]
    types: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Geometry {
    location: LatLng,
    #[serde(default)]
    location_type: String,
}

/// Blocking Google Maps client implementing every geocoding capability and
/// the image fetcher.
pub struct GoogleMaps {
    client: Client,
    base_url: String,
    api_key: String,
    zoom: u8,
    image_size: u32,
    detect_limiter: RateLimiter,
}

impl fmt::Debug for GoogleMaps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleMaps")
            .field("base_url", &self.base_url)
            .field("has_api_key", &!self.api_key.is_empty())
            .field("zoom", &self.zoom)
            .field("image_size", &self.image_size)
            .finish()
    }
}

impl GoogleMaps {
    /// Build a client from config, reading the API key from the configured
    /// environment variable. `detect_delay` spaces the detector's offset lookups.
    pub fn from_config(config: &GoogleConfig, detect_delay: Duration) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow!("environment variable {} is not set", config.api_key_env))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            zoom: config.zoom,
            image_size: config.image_size,
            detect_limiter: RateLimiter::new("detect", detect_delay),
        })
    }

    fn get(&self, endpoint: &str, params: &[(&str, String)]) -> CapabilityResult<Response> {
        let url = format!("{}/{endpoint}", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(http_status_error(status, &body));
        }
        Ok(response)
    }

    fn geocode(&self, params: &[(&str, String)]) -> CapabilityResult<Vec<GeocodeResult>> {
        let response: GeocodeResponse = self
            .get("geocode/json", params)?
            .json()
            .map_err(|err| CapabilityError::terminal(format!("decode geocode response: {err}")))?;
        geocode_results(response)
    }

    fn reverse_house_number(&self, location: LatLng) -> CapabilityResult<Option<u32>> {
        let results = self.geocode(&[
            ("latlng", format!("{},{}", location.lat, location.lng)),
            ("result_type", "street_address".to_string()),
        ])?;
        Ok(results
            .iter()
            .find_map(|result| leading_house_number(&result.formatted_address)))
    }
}

impl GeocodeAnchorResolver for GoogleMaps {
    #[instrument(skip_all, fields(street = %target.label()))]
    fn resolve(&self, target: &StreetTarget) -> CapabilityResult<Option<GeocodeAnchor>> {
        let results = self.geocode(&[("address", target.label())])?;
        let anchor = results.first().map(anchor_from);
        debug!(found = anchor.is_some(), "street resolved");
        Ok(anchor)
    }
}

impl NearestHouseNumberDetector for GoogleMaps {
    #[instrument(skip_all, fields(street = street_name, suburb = suburb))]
    fn detect(
        &self,
        location: LatLng,
        street_name: &str,
        suburb: &str,
    ) -> CapabilityResult<Option<u32>> {
        if let Some(number) = self.reverse_house_number(location)? {
            debug!(number, "house number found at center");
            return Ok(Some(number));
        }
        for delta in DETECT_OFFSETS {
            self.detect_limiter.wait_if_needed();
            if let Some(number) = self.reverse_house_number(location.offset(delta))? {
                debug!(number, delta, "house number found near center");
                return Ok(Some(number));
            }
        }
        Ok(None)
    }
}

impl GeocodeProbe for GoogleMaps {
    fn probe(
        &self,
        house_number: u32,
        street_name: &str,
        suburb: &str,
    ) -> CapabilityResult<Option<GeocodeMatch>> {
        let address = format!("{house_number} {street_name}, {suburb}");
        let results = self.geocode(&[("address", address)])?;
        Ok(unambiguous_match(&results))
    }
}

impl ImageFetcher for GoogleMaps {
    #[instrument(skip_all, fields(lat = location.lat, lng = location.lng))]
    fn fetch(&self, location: LatLng) -> CapabilityResult<Vec<u8>> {
        let response = self.get(
            "staticmap",
            &[
                ("center", format!("{},{}", location.lat, location.lng)),
                ("zoom", self.zoom.to_string()),
                ("size", format!("{0}x{0}", self.image_size)),
                ("maptype", "satellite".to_string()),
            ],
        )?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with("image/") {
            return Err(CapabilityError::terminal(format!(
                "static map returned {content_type:?} instead of an image"
            )));
        }
        let bytes = response
            .bytes()
            .map_err(|err| CapabilityError::transient(format!("read image body: {err}")))?;
        debug!(bytes = bytes.len(), "image fetched");
        Ok(bytes.to_vec())
    }
}

fn request_error(err: reqwest::Error) -> CapabilityError {
    if err.is_timeout() {
        CapabilityError::transient(format!("request timed out: {err}"))
    } else if err.is_connect() {
        CapabilityError::transient(format!("failed to connect: {err}"))
    } else {
        CapabilityError::terminal(format!("request failed: {err}"))
    }
}

fn http_status_error(status: StatusCode, body: &str) -> CapabilityError {
    let message = format!("HTTP {status}: {}", body.trim());
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        CapabilityError::transient(message)
    } else {
        CapabilityError::terminal(message)
    }
}

/// Map the geocoder's `status` field onto results or a capability error.
fn geocode_results(response: GeocodeResponse) -> CapabilityResult<Vec<GeocodeResult>> {
    let detail = response.error_message.unwrap_or_default();
    match response.status.as_str() {
        "OK" => Ok(response.results),
        "ZERO_RESULTS" => Ok(Vec::new()),
        "OVER_QUERY_LIMIT" | "UNKNOWN_ERROR" => Err(CapabilityError::transient(format!(
            "geocoder status {}: {detail}",
            response.status
        ))),
        other => Err(CapabilityError::terminal(format!(
            "geocoder status {other}: {detail}"
        ))),
    }
}

fn anchor_from(result: &GeocodeResult) -> GeocodeAnchor {
    let route = result
        .address_components
        .iter()
        .find(|component| component.types.iter().any(|t| t == "route"))
        .map(|component| component.long_name.clone());
    let formatted_street_name = route.unwrap_or_else(|| {
        result
            .formatted_address
            .split(',')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string()
    });
    GeocodeAnchor {
        formatted_street_name,
        center_location: result.geometry.location,
    }
}

/// The single full match in `results`. Several results or a partial match
/// count as no match.
fn unambiguous_match(results: &[GeocodeResult]) -> Option<GeocodeMatch> {
    match results {
        [only] if !only.partial_match => Some(match_from(only)),
        [only] => {
            debug!(address = %only.formatted_address, "partial match, ignoring");
            None
        }
        [] => None,
        many => {
            debug!(results = many.len(), "ambiguous geocode, ignoring");
            None
        }
    }
}

fn match_from(result: &GeocodeResult) -> GeocodeMatch {
    let precision = PrecisionTier::parse(&result.geometry.location_type);
    GeocodeMatch {
        formatted_address: result.formatted_address.clone(),
        location: result.geometry.location,
        precision,
        residential: is_residential(result, precision),
    }
}

/// A dwelling is a street address or rooftop hit with no business or landmark type.
fn is_residential(result: &GeocodeResult, precision: PrecisionTier) -> bool {
    let commercial = result
        .types
        .iter()
        .any(|t| NON_RESIDENTIAL_TYPES.contains(&t.as_str()));
    if commercial {
        return false;
    }
    result.types.iter().any(|t| t == "street_address") || precision == PrecisionTier::Rooftop
}
