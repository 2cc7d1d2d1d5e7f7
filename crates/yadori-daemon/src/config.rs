//! Configuration file management.
//!
//! `config.toml` lives in the data directory. Every section is optional;
//! secrets may come from the environment instead of the file.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use yadori_geocode::client::{DEFAULT_BASE_URL, DEFAULT_PROXIMITY};
use yadori_geocode::GeocoderConfig;
use yadori_push::dispatch::DEFAULT_ENDPOINT;
use yadori_push::PushConfig;

/// Overrides the data directory (and so the config file location).
pub const DATA_DIR_ENV: &str = "YADORI_DATA_DIR";
/// Overrides `geocoding.access_token`.
pub const GEOCODING_TOKEN_ENV: &str = "YADORI_GEOCODING_TOKEN";
/// Overrides `push.access_token`.
pub const PUSH_TOKEN_ENV: &str = "YADORI_PUSH_ACCESS_TOKEN";

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub geocoding: GeocodingConfig,
    #[serde(default)]
    pub push: PushSettings,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
    /// Prefix of public image URLs; the bucket name and file name follow.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// Largest accepted image upload.
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,
}

/// Geocoding endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodingConfig {
    #[serde(default = "default_geocoding_base_url")]
    pub base_url: String,
    /// Empty = address search disabled, reverse lookups give coordinates.
    #[serde(default)]
    pub access_token: String,
    /// Search bias, `[longitude, latitude]`.
    #[serde(default = "default_proximity")]
    pub proximity: [f64; 2],
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Push endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSettings {
    #[serde(default = "default_push_endpoint")]
    pub endpoint: String,
    /// Optional bearer token for the push endpoint.
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_session_ttl")]
    pub session_ttl_hours: u64,
}

/// Change feed configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Events buffered per subscriber before it starts lagging.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

/// Advanced configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Log level: "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log file path. Empty = stderr.
    #[serde(default)]
    pub log_file: String,
}

// Default value functions

fn default_public_base_url() -> String {
    "http://127.0.0.1:8080/storage".to_string()
}

fn default_max_image_bytes() -> usize {
    yadori_types::MAX_IMAGE_BYTES
}

fn default_geocoding_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_proximity() -> [f64; 2] {
    DEFAULT_PROXIMITY
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_push_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_true() -> bool {
    true
}

fn default_session_ttl() -> u64 {
    24 * 30
}

fn default_channel_capacity() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: String::new(),
            public_base_url: default_public_base_url(),
            max_image_bytes: default_max_image_bytes(),
        }
    }
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            base_url: default_geocoding_base_url(),
            access_token: String::new(),
            proximity: default_proximity(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for PushSettings {
    fn default() -> Self {
        Self {
            endpoint: default_push_endpoint(),
            access_token: String::new(),
            enabled: true,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: default_session_ttl(),
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: String::new(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the default config file location, then
    /// apply environment overrides.
    ///
    /// Falls back to defaults if file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Replace secrets with values found by `lookup`; empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup(GEOCODING_TOKEN_ENV).filter(|t| !t.is_empty()) {
            self.geocoding.access_token = token;
        }
        if let Some(token) = lookup(PUSH_TOKEN_ENV).filter(|t| !t.is_empty()) {
            self.push.access_token = token;
        }
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.auth.session_ttl_hours * 3600)
    }

    /// Settings for the geocoding client.
    pub fn geocoder(&self) -> GeocoderConfig {
        GeocoderConfig {
            base_url: self.geocoding.base_url.clone(),
            access_token: non_empty(&self.geocoding.access_token),
            proximity: self.geocoding.proximity,
            timeout: Duration::from_secs(self.geocoding.timeout_secs),
        }
    }

    /// Settings for the push dispatcher.
    pub fn push_dispatcher(&self) -> PushConfig {
        PushConfig {
            endpoint: self.push.endpoint.clone(),
            access_token: non_empty(&self.push.access_token),
            enabled: self.push.enabled,
            timeout: Duration::from_secs(self.push.timeout_secs),
        }
    }

    /// Get the config file path.
    fn config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    /// Platform-specific default data directory.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            return PathBuf::from(dir);
        }
        #[cfg(target_os = "macos")]
        {
            dirs_fallback("Library/Application Support/Yadori")
        }
        #[cfg(not(target_os = "macos"))]
        {
            dirs_fallback(".yadori")
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Fallback home directory resolution.
fn dirs_fallback(subpath: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(subpath))
        .unwrap_or_else(|_| PathBuf::from("/tmp/yadori"))
}
