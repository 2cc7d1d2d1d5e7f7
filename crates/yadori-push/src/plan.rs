//! Turning likes and comments into notifications for the review owner.

use rusqlite::Connection;
use serde_json::json;
use yadori_db::queries::{devices, reviews, users};
use yadori_types::social::{Comment, Like};

use crate::{PushNotification, Result};

/// Comment bodies longer than this are cut and suffixed with `...`.
pub const COMMENT_PREVIEW_CHARS: usize = 50;

/// Why no notification was planned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The actor owns the review.
    SelfAction,
    /// The review owner has no active device.
    NoActiveDevices,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Plan {
    Send(PushNotification),
    Skip(SkipReason),
}

/// Owner and active tokens of a review, or why nobody should be notified.
fn recipients(
    conn: &Connection,
    review_id: i64,
    actor_id: &str,
) -> Result<std::result::Result<(yadori_types::review::Review, Vec<String>), SkipReason>> {
    let review = reviews::get(conn, review_id)?;
    if review.is_owned_by(actor_id) {
        return Ok(Err(SkipReason::SelfAction));
    }
    let tokens = devices::active_tokens_for_user(conn, &review.user_id)?;
    if tokens.is_empty() {
        return Ok(Err(SkipReason::NoActiveDevices));
    }
    Ok(Ok((review, tokens)))
}

fn preview(body: &str) -> String {
    if body.chars().count() > COMMENT_PREVIEW_CHARS {
        let cut: String = body.chars().take(COMMENT_PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        body.to_string()
    }
}

/// Plan the notification for a freshly posted comment.
pub fn plan_comment_notification(conn: &Connection, comment: &Comment) -> Result<Plan> {
    let (review, tokens) = match recipients(conn, comment.review_id, &comment.user_id)? {
        Ok(found) => found,
        Err(reason) => return Ok(Plan::Skip(reason)),
    };
    let commenter = users::get(conn, &comment.user_id)?;

    Ok(Plan::Send(PushNotification {
        to: tokens,
        title: "新しいコメント！".to_string(),
        body: format!("{}さん: {}", commenter.nickname, preview(&comment.body)),
        data: json!({
            "type": "comment",
            "reviewId": review.id,
            "commentId": comment.id,
            "userId": comment.user_id,
        }),
    }))
}

/// Plan the notification for a new like.
pub fn plan_like_notification(conn: &Connection, like: &Like) -> Result<Plan> {
    let (review, tokens) = match recipients(conn, like.review_id, &like.user_id)? {
        Ok(found) => found,
        Err(reason) => return Ok(Plan::Skip(reason)),
    };
    let liker = users::get(conn, &like.user_id)?;

    Ok(Plan::Send(PushNotification {
        to: tokens,
        title: "新しいいいね！".to_string(),
        body: format!(
            "{}さんがあなたのレビュー「{}」にいいねしました",
            liker.nickname, review.address_text
        ),
        data: json!({
            "type": "like",
            "reviewId": review.id,
            "userId": like.user_id,
        }),
    }))
}
