//! Session rows. Only the BLAKE3 hash of a session token is stored.

use rusqlite::Connection;

use crate::{DbError, Result};

pub fn insert(
    conn: &Connection,
    token_hash: &[u8; 32],
    user_id: &str,
    created_at: u64,
    expires_at: u64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO sessions (token_hash, user_id, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            token_hash.as_slice(),
            user_id,
            created_at as i64,
            expires_at as i64,
        ],
    )?;
    Ok(())
}

/// Look up a live session. Expired sessions count as missing.
pub fn get_live(conn: &Connection, token_hash: &[u8; 32], now: u64) -> Result<SessionRow> {
    conn.query_row(
        "SELECT user_id, created_at, expires_at FROM sessions
         WHERE token_hash = ?1 AND expires_at > ?2",
        rusqlite::params![token_hash.as_slice(), now as i64],
        |row| {
            Ok(SessionRow {
                user_id: row.get(0)?,
                created_at: row.get::<_, i64>(1)? as u64,
                expires_at: row.get::<_, i64>(2)? as u64,
            })
        },
    )
    .map_err(|e| DbError::or_not_found(e, "session"))
}

/// Delete a session. Returns whether it existed.
pub fn delete(conn: &Connection, token_hash: &[u8; 32]) -> Result<bool> {
    let n = conn.execute(
        "DELETE FROM sessions WHERE token_hash = ?1",
        [token_hash.as_slice()],
    )?;
    Ok(n > 0)
}

/// Drop every expired session.
pub fn purge_expired(conn: &Connection, now: u64) -> Result<usize> {
    let n = conn.execute(
        "DELETE FROM sessions WHERE expires_at <= ?1",
        [now as i64],
    )?;
    Ok(n)
}

/// A raw session row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRow {
    pub user_id: String,
    pub created_at: u64,
    pub expires_at: u64,
}
