//! Push device registration.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;
use yadori_db::queries::devices;
use yadori_types::events::{RowChange, Table};
use yadori_types::social::DeviceType;

use super::{require_user, to_value, Result};
use crate::realtime::record;
use crate::rpc::{ClientContext, RpcError};
use crate::DaemonState;

fn require_token(params: &Value) -> std::result::Result<&str, RpcError> {
    params
        .get("push_token")
        .and_then(|v| v.as_str())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| RpcError::invalid_params("push_token required"))
}

/// Register the caller's device for notifications. A token registered to
/// another account moves to the caller.
pub async fn register_device(
    state: &Arc<DaemonState>,
    client: &mut ClientContext,
    params: &Value,
) -> Result {
    let user_id = require_user(state, client).await?;
    let push_token = require_token(params)?;
    let device_type = params
        .get("device_type")
        .and_then(|v| v.as_str())
        .and_then(DeviceType::parse)
        .ok_or_else(|| RpcError::invalid_params("device_type must be ios, android or web"))?;
    let platform = params
        .get("platform")
        .and_then(|v| v.as_str())
        .unwrap_or(device_type.as_str());

    let device = {
        let conn = state.db.lock().await;
        devices::upsert(
            &conn,
            push_token,
            &user_id,
            device_type,
            platform,
            yadori_types::now_secs(),
        )?
    };

    info!(user_id = %user_id, device_type = device_type.as_str(), "device registered");
    state
        .feed
        .emit(RowChange::insert(Table::UserDevices, record(&device)));
    to_value(&device)
}

/// Stop notifications to one of the caller's devices.
pub async fn unregister_device(
    state: &Arc<DaemonState>,
    client: &mut ClientContext,
    params: &Value,
) -> Result {
    let user_id = require_user(state, client).await?;
    let push_token = require_token(params)?;

    let device = {
        let conn = state.db.lock().await;
        if devices::deactivate(&conn, push_token, &user_id, yadori_types::now_secs())? {
            Some(devices::get(&conn, push_token)?)
        } else {
            None
        }
    };

    if let Some(device) = &device {
        state
            .feed
            .emit(RowChange::update(Table::UserDevices, record(device), Value::Null));
    }
    Ok(serde_json::json!({"deactivated": device.is_some()}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testutil;
    use serde_json::json;
    use yadori_db::queries::devices::active_tokens_for_user;

    #[tokio::test]
    async fn test_register_and_unregister() {
        let state = testutil::state();
        let (mut client, _rx) = testutil::client();
        let user_id = testutil::sign_up(&state, &mut client, "taro").await;

        let device = register_device(
            &state,
            &mut client,
            &json!({"push_token": "ExponentPushToken[x]", "device_type": "ios"}),
        )
        .await
        .expect("register");
        assert_eq!(device["active"], true);
        assert_eq!(device["platform"], "ios");

        let token = json!({"push_token": "ExponentPushToken[x]"});
        let out = unregister_device(&state, &mut client, &token)
            .await
            .expect("unregister");
        assert_eq!(out["deactivated"], true);

        let conn = state.db.lock().await;
        assert!(active_tokens_for_user(&conn, &user_id).expect("tokens").is_empty());
    }

    #[tokio::test]
    async fn test_token_moves_between_accounts() {
        let state = testutil::state();
        let (mut first, _rx) = testutil::client();
        let (mut second, _rx2) = testutil::client();
        let first_id = testutil::sign_up(&state, &mut first, "first").await;
        let second_id = testutil::sign_up(&state, &mut second, "second").await;
        let params = json!({
            "push_token": "shared",
            "device_type": "android",
            "platform": "android 14",
        });

        register_device(&state, &mut first, &params).await.expect("first");
        register_device(&state, &mut second, &params).await.expect("second");

        // The previous owner can no longer touch it.
        let out = unregister_device(&state, &mut first, &json!({"push_token": "shared"}))
            .await
            .expect("unregister");
        assert_eq!(out["deactivated"], false);

        let conn = state.db.lock().await;
        assert!(active_tokens_for_user(&conn, &first_id).expect("tokens").is_empty());
        assert_eq!(
            active_tokens_for_user(&conn, &second_id).expect("tokens"),
            vec!["shared".to_string()]
        );
    }

    #[tokio::test]
    async fn test_register_validation() {
        let state = testutil::state();
        let (mut client, _rx) = testutil::client();
        testutil::sign_up(&state, &mut client, "taro").await;
        let err = register_device(
            &state,
            &mut client,
            &json!({"push_token": "t", "device_type": "fridge"}),
        )
        .await
        .expect_err("bad type");
        assert_eq!(err.code, -32602);
        let err = register_device(&state, &mut client, &json!({"device_type": "web"}))
            .await
            .expect_err("no token");
        assert_eq!(err.code, -32602);
    }
}
