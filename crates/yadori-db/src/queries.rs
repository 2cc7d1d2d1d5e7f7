//! Query functions organized by table.

pub mod comments;
pub mod credentials;
pub mod devices;
pub mod images;
pub mod likes;
pub mod reviews;
pub mod sessions;
pub mod stats;
pub mod users;
