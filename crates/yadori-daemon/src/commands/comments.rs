//! Comment commands.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;
use yadori_db::queries::comments;
use yadori_types::events::{RowChange, Table};

use super::{require_id, require_user, to_value, Result};
use crate::realtime::record;
use crate::rpc::{ClientContext, RpcError};
use crate::DaemonState;

fn require_body(params: &Value) -> std::result::Result<&str, RpcError> {
    params
        .get("body")
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::invalid_params("body required"))
}

/// Comment thread of a review, oldest first.
pub async fn list_comments(state: &Arc<DaemonState>, params: &Value) -> Result {
    let review_id = require_id(params, "review_id")?;
    let thread = {
        let conn = state.db.lock().await;
        comments::list_for_review(&conn, review_id)?
    };
    to_value(&thread)
}

pub async fn create_comment(
    state: &Arc<DaemonState>,
    client: &mut ClientContext,
    params: &Value,
) -> Result {
    let user_id = require_user(state, client).await?;
    let review_id = require_id(params, "review_id")?;
    let body = require_body(params)?;

    let comment = {
        let conn = state.db.lock().await;
        comments::insert(&conn, review_id, &user_id, body, yadori_types::now_secs())?
    };

    info!(comment_id = comment.id, review_id, "comment posted");
    state
        .feed
        .emit(RowChange::insert(Table::Comments, record(&comment)));
    to_value(&comment)
}

pub async fn update_comment(
    state: &Arc<DaemonState>,
    client: &mut ClientContext,
    params: &Value,
) -> Result {
    let user_id = require_user(state, client).await?;
    let id = require_id(params, "id")?;
    let body = require_body(params)?;

    let (before, after) = {
        let conn = state.db.lock().await;
        let before = comments::get(&conn, id)?;
        let after = comments::update(&conn, id, &user_id, body, yadori_types::now_secs())?;
        (before, after)
    };

    state
        .feed
        .emit(RowChange::update(Table::Comments, record(&after), record(&before)));
    to_value(&after)
}

pub async fn delete_comment(
    state: &Arc<DaemonState>,
    client: &mut ClientContext,
    params: &Value,
) -> Result {
    let user_id = require_user(state, client).await?;
    let id = require_id(params, "id")?;

    let deleted = {
        let conn = state.db.lock().await;
        comments::delete(&conn, id, &user_id)?
    };

    info!(comment_id = id, "comment deleted");
    state
        .feed
        .emit(RowChange::delete(Table::Comments, record(&deleted)));
    Ok(serde_json::json!({"deleted": true, "id": id}))
}
