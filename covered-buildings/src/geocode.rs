//! MapQuest batch geocoding adapter.
//!
//! Turns `{street, city, state}` records into coordinates via the MapQuest
//! batch geocoding API, 100 locations per request. Every response quality
//! code is kept for downstream reporting, but coordinates are only accepted
//! when the `ZZYYY` quality code shows point or address granularity (`P1`
//! or `L1`) and no `C` or `X` in the confidence characters. Ambiguous
//! results (more than one candidate location) are rejected outright.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::transport::{Transport, TransportError};

/// MapQuest batch geocoding endpoint.
pub const BATCH_GEOCODE_URL: &str = "https://www.mapquestapi.com/geocoding/v1/batch";

/// The API accepts at most this many locations per request.
const BATCH_SIZE: usize = 100;

/// Quality string reported when the service returns multiple candidates.
pub const QUALITY_AMBIGUOUS: &str = "Ambiguous";

/// Errors from the geocoding service.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// The API key was rejected (HTTP 401) or is over its limit (403).
    #[error("MapQuest rejected the API key (HTTP {status}): key is invalid or at its limit")]
    InvalidApiKey { status: u16 },

    /// The request itself failed.
    #[error(transparent)]
    Http(#[from] TransportError),

    /// The response body did not parse as a batch geocoding response.
    #[error("unexpected geocoder response: {0}")]
    BadResponse(String),
}

/// One input address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub street: String,
    pub city: String,
    pub state: String,
}

/// One geocoding result. `quality` is always present; the remaining fields
/// are populated only for acceptable-quality results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeocodeRecord {
    /// Raw quality code (`ZZYYY`), or [`QUALITY_AMBIGUOUS`].
    pub quality: String,
    /// Street address as echoed back by the service.
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub postal_code: Option<String>,
    pub side_of_street: Option<String>,
    /// Flattened admin areas, keyed by the types the service reports.
    pub neighborhood: Option<String>,
    pub city: Option<String>,
    pub county: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

impl GeocodeRecord {
    /// `(latitude, longitude)` when the result passed the quality gate.
    pub fn coordinate(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

/// Checks granularity `P1`/`L1` and a confidence block free of `C` and `X`.
fn quality_is_acceptable(quality: &str) -> bool {
    if quality.len() < 2 {
        return false;
    }
    let (granularity, confidence) = quality.split_at(2);
    matches!(granularity, "P1" | "L1")
        && !confidence.contains('C')
        && !confidence.contains('X')
}

/// Batch geocoding client.
pub struct MapQuestGeocoder {
    transport: Arc<dyn Transport>,
    api_key: String,
}

impl MapQuestGeocoder {
    pub fn new(transport: Arc<dyn Transport>, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            api_key: api_key.into(),
        }
    }

    /// Geocodes all locations, preserving input order.
    ///
    /// Individual low-quality results are reported in-band via
    /// [`GeocodeRecord::quality`]; only transport and authentication
    /// problems fail the call.
    pub fn geocode(&self, locations: &[Location]) -> Result<Vec<GeocodeRecord>, GeocodeError> {
        let url = format!("{BATCH_GEOCODE_URL}?key={}", self.api_key);
        let mut records = Vec::with_capacity(locations.len());

        for batch in locations.chunks(BATCH_SIZE) {
            let body = json!({
                "locations": batch,
                "options": {
                    "maxResults": 2,
                    "thumbMaps": false,
                },
            });

            let bytes = match self.transport.post_json(&url, &body) {
                Ok(bytes) => bytes,
                Err(TransportError::Status { status, .. }) if status == 401 || status == 403 => {
                    return Err(GeocodeError::InvalidApiKey { status });
                }
                Err(e) => return Err(e.into()),
            };

            let response: BatchResponse = serde_json::from_slice(&bytes)
                .map_err(|e| GeocodeError::BadResponse(e.to_string()))?;
            debug!(
                batch = batch.len(),
                results = response.results.len(),
                "geocoded batch"
            );

            for result in response.results {
                records.push(process_result(result));
            }
        }

        Ok(records)
    }
}

/// Applies the quality gate and flattens one raw result into a record.
fn process_result(result: RawResult) -> GeocodeRecord {
    // Multiple candidate locations means the address itself is ambiguous.
    if result.locations.len() != 1 {
        return GeocodeRecord {
            quality: QUALITY_AMBIGUOUS.to_string(),
            ..GeocodeRecord::default()
        };
    }
    let location = result.locations.into_iter().next().unwrap_or_default();
    let quality = location.geocode_quality_code.clone().unwrap_or_default();

    if !quality_is_acceptable(&quality) {
        warn!(%quality, "geocode result below quality gate");
        return GeocodeRecord {
            quality,
            ..GeocodeRecord::default()
        };
    }

    let mut record = GeocodeRecord {
        quality,
        address: location.street.clone(),
        latitude: location.display_lat_lng.as_ref().map(|c| c.lat),
        longitude: location.display_lat_lng.as_ref().map(|c| c.lng),
        postal_code: location.postal_code.clone(),
        side_of_street: location.side_of_street.clone(),
        ..GeocodeRecord::default()
    };

    // The service reports admin areas as (value, type) pairs; only the
    // types we have columns for are kept.
    for (value, kind) in location.admin_areas() {
        let (Some(value), Some(kind)) = (value, kind) else {
            continue;
        };
        match kind.to_ascii_lowercase().as_str() {
            "neighborhood" => record.neighborhood = Some(value),
            "city" => record.city = Some(value),
            "county" => record.county = Some(value),
            "state" => record.state = Some(value),
            "country" => record.country = Some(value),
            other => debug!(kind = other, "ignoring unmapped admin area"),
        }
    }

    record
}

/// Normalizes a street line before geocoding: uppercase, collapsed
/// whitespace, trailing-period stripping, and the usual suffix and
/// directional expansions.
pub fn normalize_street(street: &str) -> String {
    street
        .split_whitespace()
        .map(|token| {
            let token = token.trim_end_matches('.').to_ascii_uppercase();
            expand_abbreviation(&token).map(str::to_string).unwrap_or(token)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn expand_abbreviation(token: &str) -> Option<&'static str> {
    let expanded = match token {
        "ST" => "STREET",
        "AVE" => "AVENUE",
        "BLVD" => "BOULEVARD",
        "DR" => "DRIVE",
        "RD" => "ROAD",
        "LN" => "LANE",
        "CT" => "COURT",
        "PL" => "PLACE",
        "PKWY" => "PARKWAY",
        "HWY" => "HIGHWAY",
        "N" => "NORTH",
        "S" => "SOUTH",
        "E" => "EAST",
        "W" => "WEST",
        "NE" => "NORTHEAST",
        "NW" => "NORTHWEST",
        "SE" => "SOUTHEAST",
        "SW" => "SOUTHWEST",
        _ => return None,
    };
    Some(expanded)
}

#[derive(Debug, Default, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    results: Vec<RawResult>,
}

#[derive(Debug, Default, Deserialize)]
struct RawResult {
    #[serde(default)]
    locations: Vec<RawLocation>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLocation {
    geocode_quality_code: Option<String>,
    display_lat_lng: Option<RawLatLng>,
    street: Option<String>,
    postal_code: Option<String>,
    side_of_street: Option<String>,
    admin_area1: Option<String>,
    admin_area1_type: Option<String>,
    admin_area2: Option<String>,
    admin_area2_type: Option<String>,
    admin_area3: Option<String>,
    admin_area3_type: Option<String>,
    admin_area4: Option<String>,
    admin_area4_type: Option<String>,
    admin_area5: Option<String>,
    admin_area5_type: Option<String>,
    admin_area6: Option<String>,
    admin_area6_type: Option<String>,
}

impl RawLocation {
    fn admin_areas(self) -> [(Option<String>, Option<String>); 6] {
        [
            (self.admin_area1, self.admin_area1_type),
            (self.admin_area2, self.admin_area2_type),
            (self.admin_area3, self.admin_area3_type),
            (self.admin_area4, self.admin_area4_type),
            (self.admin_area5, self.admin_area5_type),
            (self.admin_area6, self.admin_area6_type),
        ]
    }
}

#[derive(Debug, Deserialize)]
struct RawLatLng {
    lat: f64,
    lng: f64,
}
