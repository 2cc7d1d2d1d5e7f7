//! Profile and site-wide commands.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;
use yadori_db::queries::{stats, users};
use yadori_types::events::{RowChange, Table};
use yadori_types::user::{ProfileUpdate, PublicProfile};

use super::{parse, require_user, session_user, to_value, Result};
use crate::realtime::record;
use crate::rpc::ClientContext;
use crate::DaemonState;

/// A profile by `user_id`, or the caller's own without one. Only the
/// caller's own profile carries the email address.
pub async fn get_profile(
    state: &Arc<DaemonState>,
    client: &mut ClientContext,
    params: &Value,
) -> Result {
    let (user_id, own) = match params.get("user_id").and_then(|v| v.as_str()) {
        Some(id) => {
            let own = session_user(state, client).await?.as_deref() == Some(id);
            (id.to_string(), own)
        }
        None => (require_user(state, client).await?, true),
    };
    let user = {
        let conn = state.db.lock().await;
        users::get(&conn, &user_id)?
    };
    if own {
        to_value(&user)
    } else {
        to_value(&PublicProfile::from(&user))
    }
}

/// Edit the caller's nickname and/or bio.
pub async fn update_profile(
    state: &Arc<DaemonState>,
    client: &mut ClientContext,
    params: &Value,
) -> Result {
    let user_id = require_user(state, client).await?;
    let update: ProfileUpdate = parse(params)?;

    let (before, after) = {
        let conn = state.db.lock().await;
        let before = users::get(&conn, &user_id)?;
        let after = users::update(&conn, &user_id, update, yadori_types::now_secs())?;
        (before, after)
    };

    info!(user_id = %user_id, "profile updated");
    state
        .feed
        .emit(RowChange::update(
            Table::Users,
            record(&PublicProfile::from(&after)),
            record(&PublicProfile::from(&before)),
        ));
    to_value(&after)
}

/// Review and user totals with the overall average rating.
pub async fn get_site_stats(state: &Arc<DaemonState>) -> Result {
    let site = {
        let conn = state.db.lock().await;
        stats::site_stats(&conn)?
    };
    to_value(&site)
}
