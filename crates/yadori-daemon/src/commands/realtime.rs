//! Change subscriptions bound to a connection.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use yadori_types::events::{EventKind, RowChange, RowFilter, SubscriptionConfig, Table};
use yadori_types::ErrorKind;

use super::{parse, require_id, require_user, session_user, Result};
use crate::realtime::{self, new_subscription_id, ChangeHandler};
use crate::rpc::{ClientContext, Notifier, RpcError};
use crate::DaemonState;

/// Pushes every matching change to the connection as `row_change`.
struct Forward {
    subscription_id: String,
    notifier: Notifier,
}

impl ChangeHandler for Forward {
    fn on_change(&self, change: &RowChange) {
        self.notifier.notify(
            "row_change",
            json!({"subscription_id": self.subscription_id, "change": change}),
        );
    }
}

#[derive(Deserialize)]
struct TableParams {
    table: Table,
    #[serde(default)]
    filter: Option<String>,
    #[serde(default)]
    event: EventKind,
}

/// Open a subscription on this connection.
///
/// `{table, filter?, event?}` forwards raw row changes; `{watch:
/// "like_count" | "comments", review_id}` pushes the refreshed aggregate
/// instead.
///
/// `user_devices` and `auth` changes are only ever delivered for the
/// caller's own user, and end when the connection signs out or switches
/// users.
pub async fn subscribe_changes(
    state: &Arc<DaemonState>,
    client: &mut ClientContext,
    params: &Value,
) -> Result {
    let id = new_subscription_id();
    let notifier = client.notifier();

    let mut private = false;
    let subscription = match params.get("watch").and_then(|v| v.as_str()) {
        Some("like_count") => {
            let review_id = require_id(params, "review_id")?;
            let viewer = session_user(state, client).await?;
            let sub_id = id.clone();
            realtime::watch_like_count(&state.feed, state.db.clone(), review_id, viewer, move |s| {
                notifier.notify(
                    "like_count",
                    json!({"subscription_id": sub_id, "review_id": review_id, "state": s}),
                );
            })
        }
        Some("comments") => {
            let review_id = require_id(params, "review_id")?;
            let sub_id = id.clone();
            realtime::watch_comments(&state.feed, state.db.clone(), review_id, move |thread| {
                notifier.notify(
                    "comments",
                    json!({"subscription_id": sub_id, "review_id": review_id, "comments": thread}),
                );
            })
        }
        Some(other) => {
            return Err(RpcError::invalid_params(&format!("unknown watch {other}")));
        }
        None => {
            let params: TableParams = parse(params)?;
            let filter = params
                .filter
                .map(|f| f.parse::<RowFilter>())
                .transpose()?;
            let filter = match params.table {
                Table::UserDevices | Table::Auth => {
                    let own = RowFilter::eq("user_id", require_user(state, client).await?);
                    if filter.as_ref().is_some_and(|f| *f != own) {
                        return Err(RpcError::from_kind(
                            ErrorKind::Forbidden,
                            "only your own user_id can be watched",
                        ));
                    }
                    private = true;
                    Some(own)
                }
                _ => filter,
            };
            let mut config = SubscriptionConfig::table(params.table).with_event(params.event);
            if let Some(filter) = filter {
                config = config.with_filter(filter);
            }
            let handler = Forward {
                subscription_id: id.clone(),
                notifier,
            };
            realtime::subscribe(&state.feed, vec![config], Arc::new(handler))
        }
    };

    if private {
        client.add_private_subscription(id.clone(), subscription);
    } else {
        client.add_subscription(id.clone(), subscription);
    }
    debug!(subscription_id = %id, total = client.subscription_count(), "subscription opened");
    Ok(json!({"subscription_id": id}))
}

pub async fn unsubscribe_changes(client: &mut ClientContext, params: &Value) -> Result {
    let id = params
        .get("subscription_id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::invalid_params("subscription_id required"))?;
    Ok(json!({"unsubscribed": client.remove_subscription(id)}))
}
