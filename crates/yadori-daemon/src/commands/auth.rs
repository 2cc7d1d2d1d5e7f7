//! Account commands.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;
use yadori_db::queries::{devices, sessions, users};
use yadori_db::DbError;
use yadori_types::events::{AuthStateChange, RowChange, Table};
use yadori_types::user::PublicProfile;

use super::{session_user, to_value, Result};
use crate::auth::{self as accounts, token_hash, AuthSession};
use crate::realtime::record;
use crate::rpc::{BoundSession, ClientContext, RpcError};
use crate::DaemonState;

fn credentials(params: &Value) -> std::result::Result<(&str, &str), RpcError> {
    let email = params
        .get("email")
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::invalid_params("email required"))?;
    let password = params
        .get("password")
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::invalid_params("password required"))?;
    Ok((email, password))
}

fn announce(state: &DaemonState, change: AuthStateChange) {
    state.feed.emit(RowChange::insert(Table::Auth, record(&change)));
}

/// Bind a new session to the connection and tell observers.
fn bind(state: &DaemonState, client: &mut ClientContext, session: &AuthSession) -> Result {
    client.bind(BoundSession {
        token_hash: token_hash(&session.token),
        user_id: session.user.id.clone(),
    });
    announce(
        state,
        AuthStateChange::SignedIn {
            user_id: session.user.id.clone(),
        },
    );
    to_value(session)
}

/// Run password hashing on the blocking pool, off the database lock.
async fn off_lock<T, F>(work: F) -> std::result::Result<T, RpcError>
where
    T: Send + 'static,
    F: FnOnce() -> accounts::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| RpcError::internal_error(&e.to_string()))?
        .map_err(RpcError::from)
}

/// Create an account and sign the connection in.
pub async fn sign_up(
    state: &Arc<DaemonState>,
    client: &mut ClientContext,
    params: &Value,
) -> Result {
    let (email, password) = credentials(params)?;
    let email = accounts::normalize_email(email)?;
    let nickname = params.get("nickname").and_then(|v| v.as_str());

    let password = password.to_string();
    let credential = off_lock(move || accounts::new_credential(&password)).await?;
    let session = {
        let conn = state.db.lock().await;
        accounts::sign_up(
            &conn,
            &email,
            &credential,
            nickname,
            state.config.session_ttl(),
            yadori_types::now_secs(),
        )?
    };
    let profile = PublicProfile::from(&session.user);
    state.feed.emit(RowChange::insert(Table::Users, record(&profile)));
    bind(state, client, &session)
}

/// Sign the connection in with email and password.
pub async fn sign_in(
    state: &Arc<DaemonState>,
    client: &mut ClientContext,
    params: &Value,
) -> Result {
    let (email, password) = credentials(params)?;
    let stored = {
        let conn = state.db.lock().await;
        accounts::lookup(&conn, email)?
    };
    let password = password.to_string();
    let stored = off_lock(move || stored.verify(&password).map(|()| stored)).await?;

    info!(user_id = %stored.user.id, "signed in");
    let session = {
        let conn = state.db.lock().await;
        accounts::open_session(
            &conn,
            stored.user,
            state.config.session_ttl(),
            yadori_types::now_secs(),
        )?
    };
    bind(state, client, &session)
}

/// End the connection's session. An optional `push_token` is deactivated
/// first so the device stops receiving notifications.
pub async fn sign_out(
    state: &Arc<DaemonState>,
    client: &mut ClientContext,
    params: &Value,
) -> Result {
    let Some(bound) = client.unbind() else {
        return Ok(serde_json::json!({"signed_out": false}));
    };
    let push_token = params.get("push_token").and_then(|v| v.as_str());

    let now = yadori_types::now_secs();
    let owner = {
        let conn = state.db.lock().await;
        if let Some(token) = push_token {
            if devices::deactivate(&conn, token, &bound.user_id, now)? {
                info!(user_id = %bound.user_id, "device deactivated at sign-out");
            }
        }
        accounts::sign_out(&conn, &bound.token_hash, now)?
    };

    if let Some(user_id) = &owner {
        announce(
            state,
            AuthStateChange::SignedOut {
                user_id: user_id.clone(),
            },
        );
    }
    Ok(serde_json::json!({"signed_out": owner.is_some()}))
}

/// The signed-in user, or `null`.
pub async fn get_session(state: &Arc<DaemonState>, client: &mut ClientContext) -> Result {
    let Some(user_id) = session_user(state, client).await? else {
        return Ok(serde_json::json!({"user": null}));
    };
    let Some(bound) = client.session().cloned() else {
        return Ok(serde_json::json!({"user": null}));
    };

    let (user, session) = {
        let conn = state.db.lock().await;
        let user = users::get(&conn, &user_id)?;
        let session = sessions::get_live(&conn, &bound.token_hash, yadori_types::now_secs())?;
        (user, session)
    };
    Ok(serde_json::json!({
        "user": to_value(&user)?,
        "expires_at": session.expires_at,
    }))
}

/// Re-bind the connection to a stored token.
pub async fn resume_session(
    state: &Arc<DaemonState>,
    client: &mut ClientContext,
    params: &Value,
) -> Result {
    let token = params
        .get("token")
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::invalid_params("token required"))?;

    let hash = token_hash(token);
    let now = yadori_types::now_secs();
    let (user, expires_at) = {
        let conn = state.db.lock().await;
        let user = accounts::resolve(&conn, token, now)?;
        let session = sessions::get_live(&conn, &hash, now).map_err(|e| match e {
            DbError::NotFound(_) => RpcError::from(accounts::AuthError::SessionExpired),
            other => other.into(),
        })?;
        (user, session.expires_at)
    };

    client.bind(BoundSession {
        token_hash: hash,
        user_id: user.id.clone(),
    });
    announce(
        state,
        AuthStateChange::SignedIn {
            user_id: user.id.clone(),
        },
    );
    Ok(serde_json::json!({
        "user": to_value(&user)?,
        "expires_at": expires_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testutil;
    use serde_json::json;

    #[tokio::test]
    async fn test_sign_up_binds_session() {
        let state = testutil::state();
        let (mut client, _rx) = testutil::client();
        let mut feed = state.feed.subscribe();

        let result = sign_up(
            &state,
            &mut client,
            &json!({"email": "Hanako@example.jp", "password": "secret1", "nickname": "はなこ"}),
        )
        .await
        .expect("sign up");
        assert_eq!(result["user"]["nickname"], "はなこ");
        assert!(result["token"].as_str().is_some_and(|t| t.len() == 64));
        assert!(client.session().is_some());

        let users_change = feed.try_recv().expect("users change");
        assert_eq!(users_change.table, Table::Users);
        assert_eq!(users_change.record["nickname"], "はなこ");
        assert!(users_change.record.get("email").is_none());
        let auth_change = feed.try_recv().expect("auth change");
        assert_eq!(auth_change.table, Table::Auth);
        assert_eq!(auth_change.record["event"], "SIGNED_IN");

        let session = get_session(&state, &mut client).await.expect("session");
        assert_eq!(session["user"]["email"], "hanako@example.jp");
    }

    #[tokio::test]
    async fn test_sign_in_errors() {
        let state = testutil::state();
        let (mut client, _rx) = testutil::client();
        testutil::sign_up(&state, &mut client, "taro").await;

        let (mut other, _rx2) = testutil::client();
        let err = sign_in(
            &state,
            &mut other,
            &json!({"email": "taro@example.jp", "password": "nope!!"}),
        )
        .await
        .expect_err("wrong password");
        assert_eq!(testutil::kind(&err), "auth");
        assert!(other.session().is_none());

        let err = sign_in(&state, &mut other, &json!({"email": "taro@example.jp"}))
            .await
            .expect_err("missing password");
        assert_eq!(err.code, -32602);
    }

    #[tokio::test]
    async fn test_sign_out_and_resume() {
        let state = testutil::state();
        let (mut client, _rx) = testutil::client();
        let result = sign_up(
            &state,
            &mut client,
            &json!({"email": "jiro@example.jp", "password": "secret1"}),
        )
        .await
        .expect("sign up");
        let token = result["token"].as_str().expect("token").to_string();

        // A second connection resumes the same session.
        let (mut second, _rx2) = testutil::client();
        let resumed = resume_session(&state, &mut second, &json!({"token": token}))
            .await
            .expect("resume");
        assert_eq!(resumed["user"]["nickname"], "jiro");

        let out = sign_out(&state, &mut client, &json!({})).await.expect("sign out");
        assert_eq!(out["signed_out"], true);
        assert!(client.session().is_none());

        // The shared session is gone for the other connection too.
        let session = get_session(&state, &mut second).await.expect("session");
        assert!(session["user"].is_null());
        assert!(second.session().is_none());

        let err = resume_session(&state, &mut second, &json!({"token": token}))
            .await
            .expect_err("resume after sign out");
        assert_eq!(testutil::kind(&err), "auth");

        let again = sign_out(&state, &mut client, &json!({})).await.expect("sign out");
        assert_eq!(again["signed_out"], false);
    }

    #[tokio::test]
    async fn test_password_hashing_needs_no_store_lock() {
        let state = testutil::state();
        let held = state.db.lock().await;
        let credential = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            off_lock(|| accounts::new_credential("secret1")),
        )
        .await
        .expect("hashing waited on the store")
        .expect("credential");
        drop(held);

        let ttl = state.config.session_ttl();
        let session = {
            let conn = state.db.lock().await;
            accounts::sign_up(&conn, "kyoko@example.jp", &credential, None, ttl, 1)
                .expect("sign up")
        };
        let stored = {
            let conn = state.db.lock().await;
            accounts::lookup(&conn, "kyoko@example.jp").expect("lookup")
        };
        assert_eq!(stored.user.id, session.user.id);
        let stored = off_lock(move || stored.verify("secret1").map(|()| stored))
            .await
            .expect("verify");
        assert_eq!(stored.user.nickname, "kyoko");
    }
}
