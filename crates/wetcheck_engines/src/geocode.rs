#![forbid(unsafe_code)]

use std::io::Read;
use std::time::Duration;

use serde::Deserialize;
use wetcheck_contracts::record::GeoPoint;

const NOMINATIM_ENDPOINT: &str = "https://nominatim.openstreetmap.org/reverse";
const RESPONSE_BYTE_CAP: u64 = 256 * 1024;

/// Best-effort address enrichment derived from a reverse-geocode hit.
/// Either part may be empty; callers only overwrite fields the user has
/// not already filled in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReverseGeocodeOk {
    pub street: String,
    pub locality: String,
}

impl ReverseGeocodeOk {
    pub fn is_empty(&self) -> bool {
        self.street.is_empty() && self.locality.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeocodeErrorKind {
    Timeout,
    Transport,
    UpstreamStatus(u16),
    Decode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeocodeError {
    pub provider: &'static str,
    pub kind: GeocodeErrorKind,
    pub detail: String,
}

#[derive(Debug, Clone)]
pub struct NominatimReverseGeocoder {
    agent: ureq::Agent,
    endpoint: String,
}

impl Default for NominatimReverseGeocoder {
    fn default() -> Self {
        Self::new()
    }
}

impl NominatimReverseGeocoder {
    pub fn new() -> Self {
        Self::with_endpoint(NOMINATIM_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout(Duration::from_secs(10))
            .build();
        Self {
            agent,
            endpoint: endpoint.into(),
        }
    }

    pub fn reverse(&self, point: GeoPoint) -> Result<ReverseGeocodeOk, GeocodeError> {
        let response = self
            .agent
            .get(&self.endpoint)
            .query("lat", &format!("{:.7}", point.lat))
            .query("lon", &format!("{:.7}", point.lng))
            .query("format", "json")
            .query("addressdetails", "1")
            .set("Accept-Language", "en")
            .call()
            .map_err(|e| error_from_ureq("nominatim", e))?;

        let mut body = String::new();
        response
            .into_reader()
            .take(RESPONSE_BYTE_CAP)
            .read_to_string(&mut body)
            .map_err(|e| GeocodeError {
                provider: "nominatim",
                kind: GeocodeErrorKind::Decode,
                detail: e.to_string(),
            })?;
        decode_reverse_body(&body)
    }
}

fn error_from_ureq(provider: &'static str, err: ureq::Error) -> GeocodeError {
    match err {
        ureq::Error::Status(code, _) => GeocodeError {
            provider,
            kind: GeocodeErrorKind::UpstreamStatus(code),
            detail: format!("upstream returned HTTP {code}"),
        },
        ureq::Error::Transport(transport) => {
            let detail = transport.to_string();
            let kind = if detail.contains("timed out") {
                GeocodeErrorKind::Timeout
            } else {
                GeocodeErrorKind::Transport
            };
            GeocodeError {
                provider,
                kind,
                detail,
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    #[serde(default)]
    house_number: String,
    #[serde(default)]
    road: String,
    #[serde(default)]
    city: String,
    #[serde(default)]
    town: String,
    #[serde(default)]
    village: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    postcode: String,
}

#[derive(Debug, Default, Deserialize)]
struct NominatimReverse {
    #[serde(default)]
    address: Option<NominatimAddress>,
}

fn decode_reverse_body(body: &str) -> Result<ReverseGeocodeOk, GeocodeError> {
    let decoded: NominatimReverse =
        serde_json::from_str(body).map_err(|e| GeocodeError {
            provider: "nominatim",
            kind: GeocodeErrorKind::Decode,
            detail: e.to_string(),
        })?;
    let Some(a) = decoded.address else {
        return Ok(ReverseGeocodeOk::default());
    };
    let street = join_nonempty(&[&a.house_number, &a.road], " ");
    let settlement = [&a.city, &a.town, &a.village]
        .into_iter()
        .find(|s| !s.is_empty())
        .cloned()
        .unwrap_or_default();
    let locality = join_nonempty(&[&settlement, &a.state, &a.postcode], ", ");
    Ok(ReverseGeocodeOk { street, locality })
}

fn join_nonempty(parts: &[&String], sep: &str) -> String {
    parts
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(sep)
}
