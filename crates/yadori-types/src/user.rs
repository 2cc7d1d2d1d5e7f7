//! User profile structures.

use serde::{Deserialize, Serialize};

use crate::{UserId, ValidationError, MAX_BIO_LEN, MAX_NICKNAME_LEN};

/// A row of the `users` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct User {
    pub id: UserId,
    pub nickname: String,
    pub email: String,
    pub bio: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

/// What other users may see of a profile: everything but the email.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct PublicProfile {
    pub id: UserId,
    pub nickname: String,
    pub bio: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl From<&User> for PublicProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            nickname: user.nickname.clone(),
            bio: user.bio.clone(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Partial profile edit.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

impl ProfileUpdate {
    /// Trim fields and enforce the profile form limits.
    pub fn normalized(self) -> Result<Self, ValidationError> {
        let nickname = match self.nickname {
            Some(n) => Some(validate_nickname(&n)?),
            None => None,
        };
        let bio = match self.bio {
            Some(b) => {
                let b = b.trim().to_string();
                if b.chars().count() > MAX_BIO_LEN {
                    return Err(ValidationError::TooLong {
                        field: "bio",
                        max: MAX_BIO_LEN,
                    });
                }
                Some(b)
            }
            None => None,
        };
        Ok(Self { nickname, bio })
    }
}

/// Trim and check a nickname.
pub fn validate_nickname(nickname: &str) -> Result<String, ValidationError> {
    let nickname = nickname.trim();
    if nickname.is_empty() {
        return Err(ValidationError::Required("nickname"));
    }
    if nickname.chars().count() > MAX_NICKNAME_LEN {
        return Err(ValidationError::TooLong {
            field: "nickname",
            max: MAX_NICKNAME_LEN,
        });
    }
    Ok(nickname.to_string())
}

/// Nickname given to a profile created implicitly on first fetch.
pub fn default_nickname(email: &str) -> String {
    match email.split('@').next() {
        Some(local) if !local.is_empty() => local.to_string(),
        _ => "ユーザー".to_string(),
    }
}
