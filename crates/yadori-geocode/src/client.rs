//! Forward and reverse lookups over HTTP.

use std::time::Duration;

use url::Url;

use crate::feature::{
    address_confidence, format_japanese_address, FeatureCollection, GeocodingResult, LocationData,
};
use crate::{GeocodeError, Result};

/// Public Mapbox endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.mapbox.com";

/// Tokyo Station, `[longitude, latitude]`.
pub const DEFAULT_PROXIMITY: [f64; 2] = [139.7671, 35.6812];

/// Connection settings for [`GeocodingClient`].
#[derive(Clone, Debug)]
pub struct GeocoderConfig {
    pub base_url: String,
    pub access_token: Option<String>,
    pub proximity: [f64; 2],
    pub timeout: Duration,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            access_token: None,
            proximity: DEFAULT_PROXIMITY,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Options of an address search.
#[derive(Clone, Debug)]
pub struct ForwardOptions {
    pub country: String,
    pub language: String,
    pub limit: u32,
    pub types: Vec<String>,
    /// Bias point; the client's configured proximity when `None`.
    pub proximity: Option<[f64; 2]>,
}

impl Default for ForwardOptions {
    fn default() -> Self {
        Self {
            country: "JP".to_string(),
            language: "ja".to_string(),
            limit: 8,
            types: vec!["address".into(), "poi".into(), "place".into()],
            proximity: None,
        }
    }
}

/// Coordinate rounding before a reverse lookup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// Coordinates used as given.
    #[default]
    High,
    /// Three decimals (about 100 m).
    Medium,
    /// Two decimals (about 1 km).
    Low,
}

impl Precision {
    pub fn round(self, value: f64) -> f64 {
        match self {
            Precision::High => value,
            Precision::Medium => (value * 1000.0).round() / 1000.0,
            Precision::Low => (value * 100.0).round() / 100.0,
        }
    }
}

/// Options of a reverse lookup.
#[derive(Clone, Debug)]
pub struct ReverseOptions {
    pub country: String,
    pub language: String,
    pub types: Vec<String>,
    pub precision: Precision,
}

impl Default for ReverseOptions {
    fn default() -> Self {
        Self {
            country: "JP".to_string(),
            language: "ja".to_string(),
            types: vec!["address".into(), "poi".into(), "place".into()],
            precision: Precision::High,
        }
    }
}

/// Client for the geocoding endpoint.
#[derive(Clone, Debug)]
pub struct GeocodingClient {
    http: reqwest::Client,
    config: GeocoderConfig,
}

impl GeocodingClient {
    pub fn new(config: GeocoderConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GeocodeError::Network(e.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn has_token(&self) -> bool {
        self.token().is_ok()
    }

    fn token(&self) -> Result<&str> {
        self.config
            .access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(GeocodeError::MissingToken)
    }

    /// `{base}/geocoding/v5/mapbox.places/{query}.json` with the query
    /// percent-encoded as one path segment.
    fn places_url(&self, query: &str) -> Result<Url> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| GeocodeError::InvalidEndpoint(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| GeocodeError::InvalidEndpoint(self.config.base_url.clone()))?
            .pop_if_empty()
            .extend(["geocoding", "v5", "mapbox.places", &format!("{query}.json")]);
        Ok(url)
    }

    async fn fetch(&self, url: Url) -> Result<Vec<GeocodingResult>> {
        tracing::debug!(path = url.path(), "geocoding request");
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::from_status(status.as_u16()));
        }
        let body: FeatureCollection = response.json().await?;
        Ok(body.features)
    }

    /// Search for an address or place name; results ranked by the endpoint.
    pub async fn geocode_address(
        &self,
        address: &str,
        options: &ForwardOptions,
    ) -> Result<Vec<GeocodingResult>> {
        let token = self.token()?;
        let proximity = options.proximity.unwrap_or(self.config.proximity);

        let mut url = self.places_url(address)?;
        url.query_pairs_mut()
            .append_pair("access_token", token)
            .append_pair("country", &options.country)
            .append_pair("language", &options.language)
            .append_pair("limit", &options.limit.to_string())
            .append_pair("types", &options.types.join(","))
            .append_pair("proximity", &format!("{},{}", proximity[0], proximity[1]));

        let mut features = self.fetch(url).await.map_err(|e| {
            tracing::warn!(error = %e, "address search failed");
            e
        })?;
        features.truncate(options.limit as usize);
        Ok(features)
    }

    /// Resolve coordinates to an address. Never fails: a failed precise
    /// lookup degrades to an approximate place name, then to raw
    /// coordinates.
    pub async fn reverse_geocode(
        &self,
        longitude: f64,
        latitude: f64,
        options: &ReverseOptions,
    ) -> LocationData {
        match self.reverse_precise(longitude, latitude, options).await {
            Ok(Some(location)) => return location,
            Ok(None) => tracing::debug!("no precise match, widening search"),
            Err(e) => tracing::warn!(error = %e, "reverse geocoding failed, widening search"),
        }

        match self.reverse_broad(longitude, latitude, &options.language).await {
            Ok(Some(location)) => return location,
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "broad reverse geocoding failed"),
        }

        coordinate_location(longitude, latitude)
    }

    async fn reverse_precise(
        &self,
        longitude: f64,
        latitude: f64,
        options: &ReverseOptions,
    ) -> Result<Option<LocationData>> {
        let token = self.token()?;
        let lon = options.precision.round(longitude);
        let lat = options.precision.round(latitude);

        let mut url = self.places_url(&format!("{lon},{lat}"))?;
        url.query_pairs_mut()
            .append_pair("access_token", token)
            .append_pair("language", &options.language)
            .append_pair("types", &options.types.join(","))
            .append_pair("country", &options.country)
            .append_pair("limit", "1");

        let Some(feature) = self.fetch(url).await?.into_iter().next() else {
            return Ok(None);
        };

        let formatted = format_japanese_address(&feature);
        let address = if !formatted.is_empty() {
            formatted
        } else if !feature.place_name.is_empty() {
            feature.place_name.clone()
        } else {
            format!("{latitude:.6}, {longitude:.6}")
        };

        Ok(Some(LocationData {
            address,
            latitude: lat,
            longitude: lon,
            confidence: Some(address_confidence(&feature)),
            place_type: Some(
                feature
                    .place_type
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string()),
            ),
            formatted_address: Some(feature.place_name),
        }))
    }

    async fn reverse_broad(
        &self,
        longitude: f64,
        latitude: f64,
        language: &str,
    ) -> Result<Option<LocationData>> {
        let token = self.token()?;
        let mut url = self.places_url(&format!("{longitude},{latitude}"))?;
        url.query_pairs_mut()
            .append_pair("access_token", token)
            .append_pair("language", language)
            .append_pair("types", "place,district,locality")
            .append_pair("country", "JP")
            .append_pair("limit", "1");

        Ok(self
            .fetch(url)
            .await?
            .into_iter()
            .next()
            .map(|feature| LocationData {
                address: format!("{}付近", feature.text),
                latitude,
                longitude,
                formatted_address: Some(feature.place_name),
                place_type: Some("approximate".to_string()),
                confidence: Some(0.3),
            }))
    }
}

/// Last-resort location naming only the coordinates.
pub fn coordinate_location(longitude: f64, latitude: f64) -> LocationData {
    LocationData {
        address: format!("緯度: {latitude:.6}, 経度: {longitude:.6}"),
        latitude,
        longitude,
        formatted_address: Some(format!("座標: {latitude:.6}, {longitude:.6}")),
        place_type: Some("coordinate".to_string()),
        confidence: Some(0.1),
    }
}
