//! Like commands.

use std::sync::Arc;

use rusqlite::Connection;
use serde_json::Value;
use yadori_db::queries::likes;
use yadori_types::events::{RowChange, Table};
use yadori_types::social::Like;
use yadori_types::ReviewId;

use super::{require_id, require_user, session_user, to_value, Result};
use crate::realtime::record;
use crate::rpc::{ClientContext, RpcError};
use crate::DaemonState;

/// Row change for a like that flipped: the row now stored, or the row
/// that was removed.
fn flipped(
    conn: &Connection,
    before: Option<Like>,
    review_id: ReviewId,
    user_id: &str,
) -> std::result::Result<Option<RowChange>, RpcError> {
    let after = likes::get(conn, review_id, user_id)?;
    Ok(match (before, after) {
        (None, Some(inserted)) => Some(RowChange::insert(Table::Likes, record(&inserted))),
        (Some(removed), None) => Some(RowChange::delete(Table::Likes, record(&removed))),
        _ => None,
    })
}

/// Like the review if the caller has not, otherwise unlike it.
pub async fn toggle_like(
    state: &Arc<DaemonState>,
    client: &mut ClientContext,
    params: &Value,
) -> Result {
    let user_id = require_user(state, client).await?;
    let review_id = require_id(params, "review_id")?;

    let (after, change) = {
        let conn = state.db.lock().await;
        let before = likes::get(&conn, review_id, &user_id)?;
        let after = likes::toggle(&conn, review_id, &user_id)?;
        (after, flipped(&conn, before, review_id, &user_id)?)
    };
    if let Some(change) = change {
        state.feed.emit(change);
    }
    to_value(&after)
}

/// Idempotent form of [`toggle_like`]: `liked` is the wanted state.
pub async fn set_like(
    state: &Arc<DaemonState>,
    client: &mut ClientContext,
    params: &Value,
) -> Result {
    let user_id = require_user(state, client).await?;
    let review_id = require_id(params, "review_id")?;
    let liked = params
        .get("liked")
        .and_then(|v| v.as_bool())
        .ok_or_else(|| RpcError::invalid_params("liked required"))?;

    let (after, change) = {
        let conn = state.db.lock().await;
        let before = likes::get(&conn, review_id, &user_id)?;
        let after = likes::set(&conn, review_id, &user_id, liked)?;
        (after, flipped(&conn, before, review_id, &user_id)?)
    };
    if let Some(change) = change {
        state.feed.emit(change);
    }
    to_value(&after)
}

/// Like count of a review and whether the caller liked it.
pub async fn get_like_state(
    state: &Arc<DaemonState>,
    client: &mut ClientContext,
    params: &Value,
) -> Result {
    let review_id = require_id(params, "review_id")?;
    let viewer = session_user(state, client).await?;
    let like_state = {
        let conn = state.db.lock().await;
        likes::state(&conn, review_id, viewer.as_deref())?
    };
    to_value(&like_state)
}
