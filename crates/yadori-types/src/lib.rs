//! # yadori-types
//!
//! Shared domain types used across the Yadori workspace: table rows, the
//! rating aggregate, client-side validation rules, realtime change records
//! and the typed error categories carried through every call chain.
//!
//! Types shared with the UIs derive `ts_rs::TS` so the mobile and web
//! clients consume one set of generated bindings.

pub mod error;
pub mod events;
pub mod review;
pub mod social;
pub mod user;

pub use error::{ErrorKind, ValidationError};

/// Opaque user identifier (32 lowercase hex characters).
pub type UserId = String;
pub type ReviewId = i64;
pub type CommentId = i64;
pub type ImageId = i64;

/// Maximum images attached to a single review.
pub const MAX_REVIEW_IMAGES: usize = 5;

/// Maximum size of a single uploaded image (5 MiB).
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Maximum comment body length in characters.
pub const MAX_COMMENT_LEN: usize = 1000;

/// Maximum nickname length in characters.
pub const MAX_NICKNAME_LEN: usize = 50;

/// Maximum profile bio length in characters.
pub const MAX_BIO_LEN: usize = 500;

/// Lowest star rating.
pub const RATING_MIN: u8 = 1;

/// Highest star rating.
pub const RATING_MAX: u8 = 5;

/// Storage bucket holding review photos.
pub const REVIEW_IMAGE_BUCKET: &str = "review-images";

/// Current Unix time in seconds.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Current Unix time in milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
