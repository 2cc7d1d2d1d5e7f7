//! Geocoding features and the judgements made about them.

use serde::{Deserialize, Serialize};

use crate::address::is_japanese;

/// One context entry of a feature (`region.123`, `place.456`, ...).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct ContextEntry {
    pub id: String,
    pub text: String,
}

impl ContextEntry {
    /// Component name: the id up to the first `.`.
    fn component(&self) -> &str {
        self.id.split('.').next().unwrap_or_default()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct FeatureProperties {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub accuracy: Option<String>,
}

/// A ranked forward/reverse geocoding result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct GeocodingResult {
    pub id: String,
    pub place_name: String,
    /// `[longitude, latitude]`.
    pub center: [f64; 2],
    pub text: String,
    #[serde(default)]
    pub place_type: Vec<String>,
    #[serde(default)]
    pub properties: FeatureProperties,
    #[serde(default)]
    pub context: Option<Vec<ContextEntry>>,
}

impl GeocodingResult {
    pub fn longitude(&self) -> f64 {
        self.center[0]
    }

    pub fn latitude(&self) -> f64 {
        self.center[1]
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<GeocodingResult>,
}

/// A resolved location; reverse geocoding always produces one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct LocationData {
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub formatted_address: Option<String>,
    #[serde(default)]
    pub place_type: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Confidence in `[0.5, 1.0]` that a feature is a precise address.
pub fn address_confidence(feature: &GeocodingResult) -> f64 {
    let mut confidence = 0.5;
    let has_type = |t: &str| feature.place_type.iter().any(|p| p == t);

    if has_type("address") {
        confidence += 0.4;
    }
    if has_type("poi") {
        confidence += 0.3;
    }
    if has_type("place") {
        confidence += 0.2;
    }
    if feature.context.as_ref().is_some_and(|c| c.len() > 3) {
        confidence += 0.1;
    }
    if feature.properties.accuracy.is_some() {
        confidence += 0.1;
    }
    if feature.text.chars().any(is_japanese) {
        confidence += 0.1;
    }

    f64::min(confidence, 1.0)
}

/// Compose a Japanese-order address (prefecture first) from a feature's
/// context, falling back to `place_name`.
pub fn format_japanese_address(feature: &GeocodingResult) -> String {
    let Some(context) = &feature.context else {
        return feature.place_name.clone();
    };

    let mut region = None;
    let mut place = None;
    let mut district = None;
    let mut locality = None;
    let mut neighborhood = None;
    for entry in context {
        let slot = match entry.component() {
            "region" => &mut region,
            "place" => &mut place,
            "district" => &mut district,
            "locality" => &mut locality,
            "neighborhood" => &mut neighborhood,
            _ => continue,
        };
        *slot = Some(entry.text.as_str());
    }

    let mut parts: Vec<&str> = Vec::new();
    if let Some(r) = region {
        parts.push(r);
    }
    if let Some(p) = place.filter(|p| Some(*p) != region) {
        parts.push(p);
    }
    if let Some(d) = district.filter(|d| Some(*d) != place) {
        parts.push(d);
    }
    if let Some(l) = locality.filter(|l| Some(*l) != district) {
        parts.push(l);
    }
    if let Some(n) = neighborhood {
        parts.push(n);
    }
    if !feature.text.is_empty() && !parts.contains(&feature.text.as_str()) {
        parts.push(&feature.text);
    }

    if parts.is_empty() {
        feature.place_name.clone()
    } else {
        parts.concat()
    }
}

/// Coarse kind of a result: its category if present, otherwise guessed
/// from the place name.
pub fn address_type(result: &GeocodingResult) -> String {
    if let Some(category) = &result.properties.category {
        return category.clone();
    }
    let name = result.place_name.to_lowercase();
    let kind = if name.contains('駅') || name.contains("station") {
        "station"
    } else if name.contains('区') || name.contains('市') || name.contains('町') {
        "administrative"
    } else if name.contains("丁目") || name.contains("番地") {
        "address"
    } else {
        "poi"
    };
    kind.to_string()
}

/// Great-circle distance in meters (haversine, mean Earth radius).
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    High,
    Medium,
    Low,
}

/// Quality grade of a resolved location with hints for the user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct AddressQuality {
    pub quality: Quality,
    pub suggestions: Vec<String>,
}

pub fn assess_quality(location: &LocationData) -> AddressQuality {
    let mut quality = Quality::High;
    let mut suggestions = Vec::new();

    match location.confidence {
        Some(c) if c >= 0.7 => {}
        Some(c) if c >= 0.3 => {
            quality = Quality::Medium;
            suggestions.push(
                "住所の精度を向上させるため、建物名や番地を追加してください".to_string(),
            );
        }
        _ => {
            quality = Quality::Low;
            suggestions.push("より具体的な住所を入力してください".to_string());
        }
    }

    match location.place_type.as_deref() {
        Some("coordinate") => {
            quality = Quality::Low;
            suggestions.push("座標のみが取得されました。住所検索をお試しください".to_string());
        }
        Some("approximate") => {
            quality = Quality::Medium;
            suggestions.push("おおよその位置です。より正確な住所を入力してください".to_string());
        }
        _ => {}
    }

    AddressQuality {
        quality,
        suggestions,
    }
}
