//! JSON-RPC command handlers.
//!
//! Each submodule handles one family of methods. Handlers validate their
//! params, hold the database lock only for synchronous queries, and emit a
//! row change for every successful mutation.

pub mod auth;
pub mod comments;
pub mod devices;
pub mod geocode;
pub mod likes;
pub mod profile;
pub mod realtime;
pub mod reviews;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use yadori_db::queries::sessions;
use yadori_db::DbError;

use crate::auth::AuthError;
use crate::rpc::{ClientContext, RpcError};
use crate::DaemonState;

/// Result type for command handlers.
type Result = std::result::Result<Value, RpcError>;

/// Deserialize the whole params object.
fn parse<T: DeserializeOwned>(params: &Value) -> std::result::Result<T, RpcError> {
    let params = if params.is_null() {
        Value::Object(Default::default())
    } else {
        params.clone()
    };
    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(&e.to_string()))
}

fn require_id(params: &Value, key: &str) -> std::result::Result<i64, RpcError> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} required")))
}

fn to_value<T: Serialize>(value: &T) -> Result {
    serde_json::to_value(value).map_err(|e| RpcError::internal_error(&e.to_string()))
}

/// User of the connection's session, if it is still live. An expired
/// session is unbound.
async fn session_user(
    state: &Arc<DaemonState>,
    client: &mut ClientContext,
) -> std::result::Result<Option<String>, RpcError> {
    let Some(bound) = client.session().cloned() else {
        return Ok(None);
    };
    let live = {
        let conn = state.db.lock().await;
        sessions::get_live(&conn, &bound.token_hash, yadori_types::now_secs())
    };
    match live {
        Ok(session) => Ok(Some(session.user_id)),
        Err(DbError::NotFound(_)) => {
            client.unbind();
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// User of the connection's session, or an auth error.
async fn require_user(
    state: &Arc<DaemonState>,
    client: &mut ClientContext,
) -> std::result::Result<String, RpcError> {
    let had_session = client.session().is_some();
    match session_user(state, client).await? {
        Some(user_id) => Ok(user_id),
        None if had_session => Err(AuthError::SessionExpired.into()),
        None => Err(AuthError::NotSignedIn.into()),
    }
}
