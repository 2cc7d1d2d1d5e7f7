//! # yadori-db
//!
//! SQLite store for the Yadori service, kept at `$YADORI_DATA_DIR/yadori.db`.
//!
//! ## Schema
//!
//! - WAL mode, foreign keys enforced
//! - All timestamps are Unix epoch seconds
//! - Schema version stored in `PRAGMA user_version`
//! - Row ownership is checked inside the store: update and delete
//!   statements always carry `AND user_id = ?`

pub mod migrations;
pub mod queries;
pub mod schema;

use rusqlite::Connection;
use std::path::Path;

use yadori_types::{ErrorKind, ValidationError};

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Database error types.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not the owner of this {0}")]
    Forbidden(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl DbError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbError::NotFound(_) => ErrorKind::NotFound,
            DbError::Forbidden(_) => ErrorKind::Forbidden,
            DbError::Constraint(_) => ErrorKind::Conflict,
            DbError::Validation(_) => ErrorKind::Validation,
            DbError::Sqlite(_) | DbError::Migration(_) => ErrorKind::Internal,
        }
    }

    /// Map `QueryReturnedNoRows` to `NotFound(what)`.
    pub(crate) fn or_not_found(e: rusqlite::Error, what: &str) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => DbError::NotFound(what.into()),
            other => DbError::Sqlite(other),
        }
    }

    /// Map constraint failures to `Constraint(what)`.
    pub(crate) fn or_constraint(e: rusqlite::Error, what: &str) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(ref err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                DbError::Constraint(what.into())
            }
            other => DbError::Sqlite(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Open or create the Yadori database at the given path.
///
/// Configures WAL mode, foreign keys, and runs any pending migrations.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing).
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod testutil {
    use rusqlite::Connection;
    use yadori_types::review::{Ratings, Review, ReviewDraft};

    pub fn test_db() -> Connection {
        crate::open_memory().expect("open test db")
    }

    /// Insert a user whose id, email and nickname derive from `name`.
    pub fn user(conn: &Connection, name: &str) -> String {
        let id = format!("{name:0>32}");
        crate::queries::users::insert(conn, &id, &format!("{name}@example.jp"), name, 100)
            .expect("insert user");
        id
    }

    pub fn review(conn: &Connection, user_id: &str, address: &str, created_at: u64) -> Review {
        let draft = ReviewDraft {
            address_text: address.to_string(),
            ratings: Ratings::new(Some(3), None, None, None),
            ..Default::default()
        };
        crate::queries::reviews::insert(conn, user_id, draft, created_at).expect("insert review")
    }
}
