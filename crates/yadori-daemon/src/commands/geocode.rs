//! Address search, reverse geocoding and address checks.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use yadori_geocode::{
    address_suggestions, assess_quality, normalize_address, ForwardOptions, Precision,
    ReverseOptions,
};
use yadori_types::ValidationError;

use super::{parse, to_value, Result};
use crate::rpc::RpcError;
use crate::DaemonState;

#[derive(Deserialize)]
struct SearchParams {
    query: String,
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    proximity: Option<[f64; 2]>,
}

#[derive(Deserialize)]
struct ReverseParams {
    longitude: f64,
    latitude: f64,
    #[serde(default)]
    precision: Precision,
}

/// Ranked candidates for a typed address.
pub async fn geocode_address(state: &Arc<DaemonState>, params: &Value) -> Result {
    let params: SearchParams = parse(params)?;
    if !yadori_geocode::validate_address(&params.query) {
        return Err(ValidationError::Invalid("address").into());
    }
    let normalized = normalize_address(&params.query);

    let defaults = ForwardOptions::default();
    let options = ForwardOptions {
        limit: params.limit.unwrap_or(defaults.limit).clamp(1, 10),
        proximity: params.proximity,
        ..defaults
    };
    let results = state.geocoder.geocode_address(&normalized, &options).await?;
    to_value(&results)
}

/// Address of a point with a quality grade. Always answers; without a
/// reachable endpoint the location names only the coordinates.
pub async fn reverse_geocode(state: &Arc<DaemonState>, params: &Value) -> Result {
    let params: ReverseParams = parse(params)?;
    if !(-90.0..=90.0).contains(&params.latitude) || !(-180.0..=180.0).contains(&params.longitude)
    {
        return Err(RpcError::invalid_params("coordinates out of range"));
    }
    let options = ReverseOptions {
        precision: params.precision,
        ..ReverseOptions::default()
    };
    let location = state
        .geocoder
        .reverse_geocode(params.longitude, params.latitude, &options)
        .await;
    let quality = assess_quality(&location);
    Ok(json!({"location": location, "quality": quality}))
}

pub async fn validate_address(params: &Value) -> Result {
    let address = params
        .get("address")
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::invalid_params("address required"))?;
    Ok(json!({
        "valid": yadori_geocode::validate_address(address),
        "normalized": normalize_address(address),
        "suggestions": address_suggestions(address, None),
    }))
}
