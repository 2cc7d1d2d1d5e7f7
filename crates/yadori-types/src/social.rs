//! Comments, likes and push device registry rows.

use serde::{Deserialize, Serialize};

use crate::{CommentId, ReviewId, UserId, ValidationError, MAX_COMMENT_LEN};

/// A row of the `comments` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct Comment {
    pub id: CommentId,
    pub user_id: UserId,
    pub review_id: ReviewId,
    pub body: String,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Comment {
    /// Edit/delete controls are offered only to the author.
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

/// A comment joined to its author's nickname.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct CommentWithAuthor {
    #[serde(flatten)]
    pub comment: Comment,
    pub author_nickname: String,
}

/// Trim a comment body and check it is non-empty and within bounds.
pub fn normalize_comment_body(body: &str) -> Result<String, ValidationError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(ValidationError::Required("body"));
    }
    if body.chars().count() > MAX_COMMENT_LEN {
        return Err(ValidationError::TooLong {
            field: "body",
            max: MAX_COMMENT_LEN,
        });
    }
    Ok(body.to_string())
}

/// A row of the `likes` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct Like {
    pub user_id: UserId,
    pub review_id: ReviewId,
    pub created_at: u64,
}

/// Like state of one review as seen by one user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct LikeState {
    pub liked: bool,
    pub count: u64,
}

/// Device platform reported at registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Ios,
    Android,
    Web,
}

impl DeviceType {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceType::Ios => "ios",
            DeviceType::Android => "android",
            DeviceType::Web => "web",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ios" => Some(DeviceType::Ios),
            "android" => Some(DeviceType::Android),
            "web" => Some(DeviceType::Web),
            _ => None,
        }
    }
}

/// A row of the `user_devices` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct UserDevice {
    pub push_token: String,
    pub user_id: UserId,
    pub device_type: DeviceType,
    pub platform: String,
    pub active: bool,
    pub updated_at: u64,
}
