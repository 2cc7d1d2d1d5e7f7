//! Row change feed and subscriptions.
//!
//! Every successful mutation is emitted as a [`RowChange`] on the
//! [`ChangeFeed`]. Subscribers get their own broadcast receiver; one that
//! falls more than `realtime.channel_capacity` events behind loses the
//! overflow and keeps going.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::warn;
use yadori_db::queries::{comments, likes};
use yadori_types::events::{ChangeKind, RowChange, RowFilter, SubscriptionConfig, Table};
use yadori_types::ReviewId;
use yadori_types::social::{CommentWithAuthor, LikeState};

use crate::Db;

/// Broadcast channel of row changes.
#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<RowChange>,
    sequence: Arc<AtomicU64>,
}

impl ChangeFeed {
    /// Create a new feed with the given per-subscriber buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit a change to all subscribers.
    pub fn emit(&self, change: RowChange) {
        self.sequence.fetch_add(1, Ordering::SeqCst);
        // No subscribers is fine.
        let _ = self.sender.send(change);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RowChange> {
        self.sender.subscribe()
    }

    /// Number of changes emitted so far.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

/// JSON form of a row for a change record.
pub fn record<T: Serialize>(row: &T) -> serde_json::Value {
    serde_json::to_value(row).unwrap_or(serde_json::Value::Null)
}

/// Callbacks of a subscription. The kind-specific callback runs first,
/// then [`ChangeHandler::on_change`].
pub trait ChangeHandler: Send + Sync + 'static {
    fn on_insert(&self, _change: &RowChange) {}
    fn on_update(&self, _change: &RowChange) {}
    fn on_delete(&self, _change: &RowChange) {}
    fn on_change(&self, _change: &RowChange) {}
}

fn deliver(handler: &dyn ChangeHandler, change: &RowChange) {
    match change.kind {
        ChangeKind::Insert => handler.on_insert(change),
        ChangeKind::Update => handler.on_update(change),
        ChangeKind::Delete => handler.on_delete(change),
    }
    handler.on_change(change);
}

/// Listener tasks of one subscription. Dropping it stops them.
#[derive(Debug)]
pub struct Subscription {
    tasks: Vec<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(tasks: Vec<JoinHandle<()>>) -> Self {
        Self { tasks }
    }

    /// Stop all listener tasks now.
    pub fn cancel(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Random hex id for a new subscription.
pub fn new_subscription_id() -> String {
    let mut id = [0u8; 16];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut id);
    hex::encode(id)
}

/// Run `on_match` for every change accepted by `config`, one at a time.
///
/// The receiver is registered before this returns, so changes emitted
/// afterwards are never missed.
pub fn listen<F, Fut>(
    feed: &ChangeFeed,
    config: SubscriptionConfig,
    mut on_match: F,
) -> JoinHandle<()>
where
    F: FnMut(RowChange) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut rx = feed.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(change) => {
                    if config.matches(&change) {
                        on_match(change).await;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        table = config.table.as_str(),
                        skipped, "subscriber lagging, row changes dropped"
                    );
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// One listener per config, all feeding the same handler.
pub fn subscribe(
    feed: &ChangeFeed,
    configs: Vec<SubscriptionConfig>,
    handler: Arc<dyn ChangeHandler>,
) -> Subscription {
    let tasks = configs
        .into_iter()
        .map(|config| {
            let handler = handler.clone();
            listen(feed, config, move |change| {
                deliver(handler.as_ref(), &change);
                std::future::ready(())
            })
        })
        .collect();
    Subscription::new(tasks)
}

/// Re-read the like state of a review after every like or unlike on it.
pub fn watch_like_count<F>(
    feed: &ChangeFeed,
    db: Db,
    review_id: ReviewId,
    viewer: Option<String>,
    on_update: F,
) -> Subscription
where
    F: Fn(LikeState) + Send + Sync + 'static,
{
    let config =
        SubscriptionConfig::table(Table::Likes).with_filter(RowFilter::eq("review_id", review_id));
    let on_update = Arc::new(on_update);
    let task = listen(feed, config, move |_change| {
        let db = db.clone();
        let viewer = viewer.clone();
        let on_update = on_update.clone();
        async move {
            let state = {
                let conn = db.lock().await;
                likes::state(&conn, review_id, viewer.as_deref())
            };
            match state {
                Ok(state) => on_update(state),
                Err(e) => warn!(review_id, error = %e, "like count refresh failed"),
            }
        }
    });
    Subscription::new(vec![task])
}

/// Re-read the comment thread of a review after every comment change on it.
pub fn watch_comments<F>(
    feed: &ChangeFeed,
    db: Db,
    review_id: ReviewId,
    on_update: F,
) -> Subscription
where
    F: Fn(Vec<CommentWithAuthor>) + Send + Sync + 'static,
{
    let config = SubscriptionConfig::table(Table::Comments)
        .with_filter(RowFilter::eq("review_id", review_id));
    let on_update = Arc::new(on_update);
    let task = listen(feed, config, move |_change| {
        let db = db.clone();
        let on_update = on_update.clone();
        async move {
            let thread = {
                let conn = db.lock().await;
                comments::list_for_review(&conn, review_id)
            };
            match thread {
                Ok(thread) => on_update(thread),
                Err(e) => warn!(review_id, error = %e, "comment refresh failed"),
            }
        }
    });
    Subscription::new(vec![task])
}
