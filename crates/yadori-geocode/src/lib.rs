//! # yadori-geocode
//!
//! Address search and reverse geocoding against a Mapbox-compatible
//! geocoding endpoint, plus the pure helpers the review form uses to clean
//! up and judge addresses.
//!
//! ## Modules
//!
//! - [`client`]: HTTP client for forward and reverse lookups
//! - [`feature`]: Response features, confidence scoring and Japanese address formatting
//! - [`address`]: Address validation, normalization and suggestions

pub mod address;
pub mod client;
pub mod feature;

pub use address::{address_suggestions, normalize_address, validate_address};
pub use client::{ForwardOptions, GeocoderConfig, GeocodingClient, Precision, ReverseOptions};
pub use feature::{
    address_confidence, address_type, assess_quality, distance_meters, format_japanese_address,
    AddressQuality, GeocodingResult, LocationData, Quality,
};

use yadori_types::ErrorKind;

/// Error types for geocoding lookups.
#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    /// No access token configured.
    #[error("geocoding access token is not configured")]
    MissingToken,

    /// The endpoint answered 429.
    #[error("geocoding rate limit exceeded")]
    RateLimited,

    /// The endpoint answered 401 or 403.
    #[error("geocoding access denied (HTTP {0})")]
    Forbidden(u16),

    /// The endpoint answered 404.
    #[error("geocoding resource not found")]
    NotFound,

    /// Any other non-success status.
    #[error("geocoding request failed: HTTP {0}")]
    Http(u16),

    /// Connection, timeout or body transfer failure.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed response body.
    #[error("invalid geocoding response: {0}")]
    Decode(String),

    #[error("invalid geocoding endpoint: {0}")]
    InvalidEndpoint(String),
}

impl GeocodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GeocodeError::MissingToken => ErrorKind::Auth,
            GeocodeError::RateLimited => ErrorKind::RateLimited,
            GeocodeError::Forbidden(_) => ErrorKind::Forbidden,
            GeocodeError::NotFound => ErrorKind::NotFound,
            GeocodeError::Network(_) => ErrorKind::Network,
            GeocodeError::Http(_) | GeocodeError::Decode(_) | GeocodeError::InvalidEndpoint(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Message shown to the user, chosen by error category.
    pub fn user_message(&self) -> &'static str {
        match self {
            GeocodeError::MissingToken => "APIキーが設定されていません",
            GeocodeError::RateLimited => {
                "検索回数の上限に達しました。しばらく待ってから再試行してください"
            }
            GeocodeError::Network(_) => "ネットワークエラーが発生しました",
            GeocodeError::Forbidden(_) => "APIアクセスが拒否されました。APIキーを確認してください",
            GeocodeError::NotFound => "指定された場所が見つかりませんでした",
            GeocodeError::Http(_) | GeocodeError::Decode(_) | GeocodeError::InvalidEndpoint(_) => {
                "住所の検索に失敗しました"
            }
        }
    }

    pub(crate) fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => GeocodeError::Forbidden(status),
            404 => GeocodeError::NotFound,
            429 => GeocodeError::RateLimited,
            other => GeocodeError::Http(other),
        }
    }
}

impl From<reqwest::Error> for GeocodeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            GeocodeError::Decode(e.to_string())
        } else {
            GeocodeError::Network(e.to_string())
        }
    }
}

/// Convenience result type for geocoding operations.
pub type Result<T> = std::result::Result<T, GeocodeError>;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(GeocodeError::from_status(429), GeocodeError::RateLimited));
        assert!(matches!(GeocodeError::from_status(403), GeocodeError::Forbidden(403)));
        assert!(matches!(GeocodeError::from_status(404), GeocodeError::NotFound));
        assert!(matches!(GeocodeError::from_status(500), GeocodeError::Http(500)));
    }

    #[test]
    fn test_user_messages_by_kind() {
        assert_eq!(
            GeocodeError::MissingToken.user_message(),
            "APIキーが設定されていません"
        );
        assert_eq!(GeocodeError::MissingToken.kind(), ErrorKind::Auth);
        assert_eq!(
            GeocodeError::RateLimited.user_message(),
            "検索回数の上限に達しました。しばらく待ってから再試行してください"
        );
        assert_eq!(
            GeocodeError::Network("refused".into()).user_message(),
            "ネットワークエラーが発生しました"
        );
        assert_eq!(
            GeocodeError::NotFound.user_message(),
            "指定された場所が見つかりませんでした"
        );
        assert_eq!(GeocodeError::Http(500).user_message(), "住所の検索に失敗しました");
    }
}
