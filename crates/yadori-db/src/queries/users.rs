//! User profile queries.

use rusqlite::{Connection, OptionalExtension};
use yadori_types::user::{default_nickname, validate_nickname, ProfileUpdate, User};

use crate::{DbError, Result};

const USER_COLUMNS: &str = "id, nickname, email, bio, created_at, updated_at";

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        nickname: row.get(1)?,
        email: row.get(2)?,
        bio: row.get(3)?,
        created_at: row.get::<_, i64>(4)? as u64,
        updated_at: row.get::<_, i64>(5)? as u64,
    })
}

/// Create a user at sign-up.
pub fn insert(conn: &Connection, id: &str, email: &str, nickname: &str, now: u64) -> Result<User> {
    let nickname = validate_nickname(nickname)?;
    conn.execute(
        "INSERT INTO users (id, nickname, email, bio, created_at, updated_at)
         VALUES (?1, ?2, ?3, NULL, ?4, ?4)",
        rusqlite::params![id, nickname, email, now as i64],
    )
    .map_err(|e| DbError::or_constraint(e, "email already registered"))?;
    get(conn, id)
}

/// Get a user by id.
pub fn get(conn: &Connection, id: &str) -> Result<User> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        [id],
        user_from_row,
    )
    .map_err(|e| DbError::or_not_found(e, "user"))
}

/// Get a user by (lower-cased) email.
pub fn find_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            [email],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

/// Fetch a profile, creating it first if the account has none yet.
///
/// The implicit nickname is the local part of the email, or `ユーザー`.
pub fn ensure(conn: &Connection, id: &str, email: &str, now: u64) -> Result<User> {
    let inserted = conn.execute(
        "INSERT INTO users (id, nickname, email, bio, created_at, updated_at)
         VALUES (?1, ?2, ?3, NULL, ?4, ?4)
         ON CONFLICT(id) DO NOTHING",
        rusqlite::params![id, default_nickname(email), email, now as i64],
    )
    .map_err(|e| DbError::or_constraint(e, "email already registered"))?;
    if inserted > 0 {
        tracing::info!(user_id = id, "created missing profile");
    }
    get(conn, id)
}

/// Apply a profile edit; fields left `None` are unchanged.
pub fn update(conn: &Connection, id: &str, update: ProfileUpdate, now: u64) -> Result<User> {
    let update = update.normalized()?;
    let changed = conn.execute(
        "UPDATE users SET
            nickname = COALESCE(?2, nickname),
            bio = COALESCE(?3, bio),
            updated_at = ?4
         WHERE id = ?1",
        rusqlite::params![id, update.nickname, update.bio, now as i64],
    )?;
    if changed == 0 {
        return Err(DbError::NotFound("user".into()));
    }
    get(conn, id)
}

/// Number of registered users.
pub fn count(conn: &Connection) -> Result<u64> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    Ok(n as u64)
}
