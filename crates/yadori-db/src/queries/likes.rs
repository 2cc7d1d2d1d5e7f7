//! Like queries.
//!
//! The `(user_id, review_id)` primary key guarantees at most one like per
//! user and review; `toggle` runs inside one transaction.

use rusqlite::{Connection, OptionalExtension};
use yadori_types::social::{Like, LikeState};
use yadori_types::ReviewId;

use crate::queries::reviews;
use crate::{DbError, Result};

/// Flip the caller's like on a review and return the new state.
pub fn toggle(conn: &Connection, review_id: ReviewId, user_id: &str) -> Result<LikeState> {
    let tx = conn.unchecked_transaction()?;
    if !reviews::exists(&tx, review_id)? {
        return Err(DbError::NotFound("review".into()));
    }
    let inserted = tx.execute(
        "INSERT INTO likes (user_id, review_id, created_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(user_id, review_id) DO NOTHING",
        rusqlite::params![user_id, review_id, yadori_types::now_secs() as i64],
    )?;
    if inserted == 0 {
        tx.execute(
            "DELETE FROM likes WHERE user_id = ?1 AND review_id = ?2",
            rusqlite::params![user_id, review_id],
        )?;
    }
    let count = count(&tx, review_id)?;
    tx.commit()?;
    Ok(LikeState {
        liked: inserted > 0,
        count,
    })
}

/// Set the caller's like to `liked`. Repeating the call changes nothing.
pub fn set(
    conn: &Connection,
    review_id: ReviewId,
    user_id: &str,
    liked: bool,
) -> Result<LikeState> {
    let tx = conn.unchecked_transaction()?;
    if !reviews::exists(&tx, review_id)? {
        return Err(DbError::NotFound("review".into()));
    }
    if liked {
        tx.execute(
            "INSERT INTO likes (user_id, review_id, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id, review_id) DO NOTHING",
            rusqlite::params![user_id, review_id, yadori_types::now_secs() as i64],
        )?;
    } else {
        tx.execute(
            "DELETE FROM likes WHERE user_id = ?1 AND review_id = ?2",
            rusqlite::params![user_id, review_id],
        )?;
    }
    let count = count(&tx, review_id)?;
    tx.commit()?;
    Ok(LikeState { liked, count })
}

pub fn count(conn: &Connection, review_id: ReviewId) -> Result<u64> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM likes WHERE review_id = ?1",
        [review_id],
        |row| row.get(0),
    )?;
    Ok(n as u64)
}

/// The caller's like row on a review, if there is one.
pub fn get(conn: &Connection, review_id: ReviewId, user_id: &str) -> Result<Option<Like>> {
    let like = conn
        .query_row(
            "SELECT user_id, review_id, created_at FROM likes
             WHERE user_id = ?1 AND review_id = ?2",
            rusqlite::params![user_id, review_id],
            |row| {
                Ok(Like {
                    user_id: row.get(0)?,
                    review_id: row.get(1)?,
                    created_at: row.get::<_, i64>(2)? as u64,
                })
            },
        )
        .optional()?;
    Ok(like)
}

pub fn is_liked(conn: &Connection, review_id: ReviewId, user_id: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM likes WHERE user_id = ?1 AND review_id = ?2",
            rusqlite::params![user_id, review_id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Like state as seen by `viewer` (not liked for anonymous viewers).
pub fn state(conn: &Connection, review_id: ReviewId, viewer: Option<&str>) -> Result<LikeState> {
    let liked = match viewer {
        Some(user_id) => is_liked(conn, review_id, user_id)?,
        None => false,
    };
    Ok(LikeState {
        liked,
        count: count(conn, review_id)?,
    })
}
