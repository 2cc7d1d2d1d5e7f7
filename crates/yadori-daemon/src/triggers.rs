//! Push notifications fired by new likes and comments.
//!
//! The trigger listens on the change feed like any other subscriber and
//! does its work in detached tasks, so a slow push endpoint never holds up
//! the mutation that caused it.

use std::sync::Arc;

use tracing::{debug, info, warn};
use yadori_push::{
    plan_comment_notification, plan_like_notification, DispatchReport, Plan, PushDispatcher,
};
use yadori_types::events::{EventKind, RowChange, SubscriptionConfig, Table};
use yadori_types::social::{Comment, Like};

use crate::realtime::{subscribe, ChangeFeed, ChangeHandler, Subscription};
use crate::Db;

/// What happened to trigger a notification.
#[derive(Debug, Clone)]
pub enum Trigger {
    Comment(Comment),
    Like(Like),
}

impl Trigger {
    /// The trigger carried by an inserted `comments` or `likes` row.
    pub fn from_change(change: &RowChange) -> Option<Self> {
        let parsed = match change.table {
            Table::Comments => serde_json::from_value(change.record.clone()).map(Trigger::Comment),
            Table::Likes => serde_json::from_value(change.record.clone()).map(Trigger::Like),
            _ => return None,
        };
        match parsed {
            Ok(trigger) => Some(trigger),
            Err(e) => {
                warn!(table = change.table.as_str(), error = %e, "unreadable trigger row");
                None
            }
        }
    }
}

struct PushTrigger {
    db: Db,
    dispatcher: PushDispatcher,
}

impl ChangeHandler for PushTrigger {
    fn on_insert(&self, change: &RowChange) {
        let Some(trigger) = Trigger::from_change(change) else {
            return;
        };
        let db = self.db.clone();
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            notify(&db, &dispatcher, trigger).await;
        });
    }
}

/// Start notifying review owners about likes and comments.
pub fn spawn(feed: &ChangeFeed, db: Db, dispatcher: PushDispatcher) -> Subscription {
    subscribe(
        feed,
        vec![
            SubscriptionConfig::table(Table::Comments).with_event(EventKind::Insert),
            SubscriptionConfig::table(Table::Likes).with_event(EventKind::Insert),
        ],
        Arc::new(PushTrigger { db, dispatcher }),
    )
}

/// Plan and send the notification for one trigger. Failures are logged
/// and swallowed.
pub async fn notify(
    db: &Db,
    dispatcher: &PushDispatcher,
    trigger: Trigger,
) -> Option<DispatchReport> {
    let plan = {
        let conn = db.lock().await;
        match &trigger {
            Trigger::Comment(comment) => plan_comment_notification(&conn, comment),
            Trigger::Like(like) => plan_like_notification(&conn, like),
        }
    };

    let notification = match plan {
        Ok(Plan::Send(notification)) => notification,
        Ok(Plan::Skip(reason)) => {
            debug!(?reason, ?trigger, "no notification");
            return None;
        }
        Err(e) => {
            warn!(error = %e, ?trigger, "notification planning failed");
            return None;
        }
    };

    match dispatcher.dispatch(&notification).await {
        Ok(report) => {
            info!(messages = report.messages_sent, "review owner notified");
            Some(report)
        }
        Err(e) => {
            warn!(error = %e, kind = e.kind().as_str(), "push delivery failed");
            None
        }
    }
}
