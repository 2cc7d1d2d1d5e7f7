//! Password credentials (Argon2id output and salt).

use rusqlite::Connection;

use crate::{DbError, Result};

pub fn insert(
    conn: &Connection,
    user_id: &str,
    password_hash: &[u8],
    salt: &[u8],
    now: u64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO credentials (user_id, password_hash, salt, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![user_id, password_hash, salt, now as i64],
    )
    .map_err(|e| DbError::or_constraint(e, "credential"))?;
    Ok(())
}

pub fn get(conn: &Connection, user_id: &str) -> Result<CredentialRow> {
    conn.query_row(
        "SELECT user_id, password_hash, salt, created_at FROM credentials WHERE user_id = ?1",
        [user_id],
        |row| {
            Ok(CredentialRow {
                user_id: row.get(0)?,
                password_hash: row.get::<_, Vec<u8>>(1)?,
                salt: row.get::<_, Vec<u8>>(2)?,
                created_at: row.get::<_, i64>(3)? as u64,
            })
        },
    )
    .map_err(|e| DbError::or_not_found(e, "credential"))
}

/// A raw credential row.
#[derive(Debug)]
pub struct CredentialRow {
    pub user_id: String,
    pub password_hash: Vec<u8>,
    pub salt: Vec<u8>,
    pub created_at: u64,
}
