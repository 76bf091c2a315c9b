//! OpenStreetMap Nominatim geocoder.

use crate::error::LookupError;
use crate::location::{LocationLookup, ReverseAddress, SearchCandidate};
use crate::model::Coordinate;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org";

#[derive(Debug, Default, Deserialize)]
struct AddressDetails {
    road: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    state: Option<String>,
    country: Option<String>,
    postcode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    display_name: Option<String>,
    name: Option<String>,
    address: Option<AddressDetails>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
    display_name: Option<String>,
}

impl From<ReverseResponse> for ReverseAddress {
    fn from(response: ReverseResponse) -> Self {
        let address = response.address.unwrap_or_default();
        ReverseAddress {
            display_name: response.display_name,
            name: response.name,
            road: address.road,
            city: address.city.or(address.town).or(address.village),
            state: address.state,
            country: address.country,
            postal_code: address.postcode,
        }
    }
}

impl TryFrom<SearchHit> for SearchCandidate {
    type Error = LookupError;

    fn try_from(hit: SearchHit) -> Result<Self, Self::Error> {
        let parse = |v: &str| {
            v.trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .ok_or_else(|| LookupError::Malformed(format!("bad coordinate {v:?}")))
        };
        Ok(SearchCandidate {
            coordinate: Coordinate::new(parse(&hit.lat)?, parse(&hit.lon)?),
            display_name: hit.display_name,
        })
    }
}

pub fn parse_reverse(body: &str) -> Result<ReverseAddress, LookupError> {
    let response: ReverseResponse =
        serde_json::from_str(body).map_err(|e| LookupError::Malformed(e.to_string()))?;
    if let Some(error) = &response.error {
        tracing::debug!(error, "nominatim reverse returned no match");
        return Err(LookupError::NotFound);
    }
    Ok(response.into())
}

/// Only the best hit is decoded; the rest of the array is not inspected.
pub fn parse_search(body: &str) -> Result<Vec<SearchCandidate>, LookupError> {
    let malformed = |e: serde_json::Error| LookupError::Malformed(e.to_string());
    let hits: Vec<serde_json::Value> = serde_json::from_str(body).map_err(malformed)?;
    let Some(best) = hits.into_iter().next() else {
        return Ok(Vec::new());
    };
    let hit: SearchHit = serde_json::from_value(best).map_err(malformed)?;
    Ok(vec![SearchCandidate::try_from(hit)?])
}

#[derive(Clone, Debug)]
pub struct NominatimClient {
    client: Client,
    base_url: String,
}

impl NominatimClient {
    pub fn new(base_url: &str, user_agent: &str) -> Result<Self, LookupError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn get(&self, path: &str, query: &[(&str, String)]) -> Result<String, LookupError> {
        let url = format!("{}/{path}", self.base_url);
        tracing::debug!(%url, ?query, "nominatim request");
        let body = self
            .client
            .get(&url)
            .query(query)
            .send()?
            .error_for_status()?
            .text()?;
        Ok(body)
    }
}

impl LocationLookup for NominatimClient {
    fn search(&self, query: &str) -> Result<Vec<SearchCandidate>, LookupError> {
        let body = self.get(
            "search",
            &[
                ("format", "json".into()),
                ("q", query.to_string()),
                ("limit", "1".into()),
                ("addressdetails", "1".into()),
            ],
        )?;
        parse_search(&body)
    }

    fn reverse(&self, coordinate: Coordinate) -> Result<ReverseAddress, LookupError> {
        let body = self.get(
            "reverse",
            &[
                ("format", "json".into()),
                ("lat", coordinate.latitude.to_string()),
                ("lon", coordinate.longitude.to_string()),
                ("zoom", "18".into()),
                ("addressdetails", "1".into()),
            ],
        )?;
        parse_reverse(&body)
    }
}
