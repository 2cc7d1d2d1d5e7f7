//! # yadori-daemon
//!
//! The Yadori service process. Any UI talks to it with line-delimited
//! JSON-RPC 2.0 over a Unix socket; the daemon owns the store, the image
//! bucket, sessions, the row change feed and the push triggers.
//!
//! ## Modules
//!
//! - [`config`]: `config.toml` and environment overrides
//! - [`auth`]: Accounts, password hashing and session tokens
//! - [`storage`]: The `review-images` bucket
//! - [`realtime`]: Change feed, subscriptions and aggregate watchers
//! - [`triggers`]: Push notifications for likes and comments
//! - [`rpc`]: Socket server and method dispatch
//! - [`commands`]: One handler per RPC method

pub mod auth;
pub mod commands;
pub mod config;
pub mod realtime;
pub mod rpc;
pub mod storage;
pub mod triggers;

use std::sync::Arc;

use yadori_geocode::GeocodingClient;
use yadori_push::PushDispatcher;

use crate::config::DaemonConfig;
use crate::realtime::ChangeFeed;
use crate::storage::ImageBucket;

/// The shared database connection.
pub type Db = Arc<tokio::sync::Mutex<rusqlite::Connection>>;

/// Daemon-wide shared state.
pub struct DaemonState {
    pub db: Db,
    pub config: DaemonConfig,
    /// Row changes of every mutation.
    pub feed: ChangeFeed,
    pub bucket: ImageBucket,
    pub geocoder: GeocodingClient,
    pub push: PushDispatcher,
}

impl DaemonState {
    /// Wire up the services around an opened database.
    pub fn new(config: DaemonConfig, conn: rusqlite::Connection) -> anyhow::Result<Self> {
        Ok(Self {
            db: Arc::new(tokio::sync::Mutex::new(conn)),
            feed: ChangeFeed::new(config.realtime.channel_capacity),
            bucket: ImageBucket::new(&config.data_dir(), &config.storage.public_base_url),
            geocoder: GeocodingClient::new(config.geocoder())?,
            push: PushDispatcher::new(config.push_dispatcher())?,
            config,
        })
    }
}
