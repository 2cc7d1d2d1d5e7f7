//! Row change records for the realtime feed.
//!
//! Every committed mutation is described by one [`RowChange`]. Subscribers
//! select changes with a [`SubscriptionConfig`]: a table, an optional
//! `column=eq.value` filter and an event kind.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Tables (and the auth pseudo-table) that emit changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Users,
    Reviews,
    ReviewImages,
    Comments,
    Likes,
    UserDevices,
    /// Session sign-in/sign-out notifications.
    Auth,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Table::Users => "users",
            Table::Reviews => "reviews",
            Table::ReviewImages => "review_images",
            Table::Comments => "comments",
            Table::Likes => "likes",
            Table::UserDevices => "user_devices",
            Table::Auth => "auth",
        }
    }
}

/// What happened to the row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Event selector of a subscription.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub enum EventKind {
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
    #[default]
    #[serde(rename = "*")]
    All,
}

impl EventKind {
    pub fn accepts(self, kind: ChangeKind) -> bool {
        matches!(
            (self, kind),
            (EventKind::All, _)
                | (EventKind::Insert, ChangeKind::Insert)
                | (EventKind::Update, ChangeKind::Update)
                | (EventKind::Delete, ChangeKind::Delete)
        )
    }
}

/// One committed row mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct RowChange {
    pub table: Table,
    pub kind: ChangeKind,
    /// New row (`null` for deletes).
    pub record: serde_json::Value,
    /// Previous row for updates and deletes, when known.
    pub old_record: serde_json::Value,
    pub timestamp: u64,
}

impl RowChange {
    pub fn insert(table: Table, record: serde_json::Value) -> Self {
        Self {
            table,
            kind: ChangeKind::Insert,
            record,
            old_record: serde_json::Value::Null,
            timestamp: crate::now_secs(),
        }
    }

    pub fn update(table: Table, record: serde_json::Value, old_record: serde_json::Value) -> Self {
        Self {
            table,
            kind: ChangeKind::Update,
            record,
            old_record,
            timestamp: crate::now_secs(),
        }
    }

    pub fn delete(table: Table, old_record: serde_json::Value) -> Self {
        Self {
            table,
            kind: ChangeKind::Delete,
            record: serde_json::Value::Null,
            old_record,
            timestamp: crate::now_secs(),
        }
    }

    /// Column value from the new row, or from the old row for deletes.
    pub fn column(&self, name: &str) -> Option<&serde_json::Value> {
        self.record
            .get(name)
            .or_else(|| self.old_record.get(name))
    }
}

/// `column=eq.value` row filter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct RowFilter {
    pub column: String,
    pub value: String,
}

impl RowFilter {
    pub fn eq(column: &str, value: impl ToString) -> Self {
        Self {
            column: column.to_string(),
            value: value.to_string(),
        }
    }

    pub fn matches(&self, change: &RowChange) -> bool {
        match change.column(&self.column) {
            Some(serde_json::Value::String(s)) => *s == self.value,
            Some(serde_json::Value::Null) | None => false,
            Some(other) => other.to_string() == self.value,
        }
    }
}

impl FromStr for RowFilter {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (column, rest) = s.split_once('=').ok_or(ValidationError::Invalid("filter"))?;
        let value = rest
            .strip_prefix("eq.")
            .ok_or(ValidationError::Invalid("filter"))?;
        if column.is_empty() || value.is_empty() {
            return Err(ValidationError::Invalid("filter"));
        }
        Ok(Self::eq(column, value))
    }
}

impl fmt::Display for RowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=eq.{}", self.column, self.value)
    }
}

/// What a subscriber wants to hear about.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct SubscriptionConfig {
    pub table: Table,
    #[serde(default)]
    pub filter: Option<RowFilter>,
    #[serde(default)]
    pub event: EventKind,
}

impl SubscriptionConfig {
    pub fn table(table: Table) -> Self {
        Self {
            table,
            filter: None,
            event: EventKind::All,
        }
    }

    pub fn with_filter(mut self, filter: RowFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_event(mut self, event: EventKind) -> Self {
        self.event = event;
        self
    }

    pub fn matches(&self, change: &RowChange) -> bool {
        change.table == self.table
            && self.event.accepts(change.kind)
            && self.filter.as_ref().map_or(true, |f| f.matches(change))
    }
}

/// Session observation payload, carried as the record of `auth` changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthStateChange {
    SignedIn { user_id: String },
    SignedOut { user_id: String },
}
