//! Typed error categories.
//!
//! Every crate error in the workspace reports one of these kinds. The RPC
//! layer maps a kind to a fixed error code, so callers branch on the kind
//! rather than on message text.

use serde::{Deserialize, Serialize};

/// Closed set of failure categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing, invalid or expired credentials.
    Auth,
    /// Transport failure talking to a remote endpoint.
    Network,
    /// Remote endpoint refused because of a quota.
    RateLimited,
    /// Row or remote resource does not exist.
    NotFound,
    /// Caller does not own the row.
    Forbidden,
    /// Input rejected before any mutation.
    Validation,
    /// Uniqueness or state conflict.
    Conflict,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// Stable name used in RPC error payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth",
            ErrorKind::Network => "network",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Client-side validation failure.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange {
        field: &'static str,
        min: i64,
        max: i64,
    },

    #[error("at least one rating or a pros/cons text is required")]
    EmptyReview,

    #[error("at most {0} images per review")]
    TooManyImages(usize),

    #[error("image exceeds {0} bytes")]
    ImageTooLarge(usize),

    #[error("unsupported content type: {0}")]
    NotAnImage(String),

    #[error("invalid {0}")]
    Invalid(&'static str),
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}
