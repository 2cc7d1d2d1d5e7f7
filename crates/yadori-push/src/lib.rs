//! # yadori-push
//!
//! Push notifications for review activity.
//!
//! A like or comment on someone else's review is turned into a
//! [`PushNotification`] addressed to the review owner's active devices
//! ([`plan`]), then relayed to the Expo push endpoint ([`dispatch`]).
//! Delivery is best effort: callers log failures and move on.

pub mod dispatch;
pub mod plan;

pub use dispatch::{DispatchReport, PushConfig, PushDispatcher, PushMessage};
pub use plan::{plan_comment_notification, plan_like_notification, Plan, SkipReason};

use serde::{Deserialize, Serialize};
use yadori_db::DbError;
use yadori_types::ErrorKind;

/// A notification for one or more device tokens.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct PushNotification {
    pub to: Vec<String>,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Error types for push planning and delivery.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// Notification rejected before sending.
    #[error("invalid notification: {0}")]
    Invalid(&'static str),

    /// The push endpoint answered with a non-success status.
    #[error("push endpoint error: HTTP {0}")]
    Http(u16),

    #[error("network error: {0}")]
    Network(String),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl PushError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PushError::Invalid(_) => ErrorKind::Validation,
            PushError::Http(429) => ErrorKind::RateLimited,
            PushError::Http(_) => ErrorKind::Internal,
            PushError::Network(_) => ErrorKind::Network,
            PushError::Db(e) => e.kind(),
        }
    }
}

impl From<reqwest::Error> for PushError {
    fn from(e: reqwest::Error) -> Self {
        PushError::Network(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PushError>;
