//! Comment queries. Bodies are trimmed and bounded; edits are owner-only.

use rusqlite::Connection;
use yadori_types::social::{normalize_comment_body, Comment, CommentWithAuthor};
use yadori_types::{CommentId, ReviewId};

use crate::queries::reviews;
use crate::{DbError, Result};

fn comment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        user_id: row.get(1)?,
        review_id: row.get(2)?,
        body: row.get(3)?,
        created_at: row.get::<_, i64>(4)? as u64,
        updated_at: row.get::<_, i64>(5)? as u64,
    })
}

/// Post a comment on a review.
pub fn insert(
    conn: &Connection,
    review_id: ReviewId,
    user_id: &str,
    body: &str,
    now: u64,
) -> Result<Comment> {
    let body = normalize_comment_body(body)?;
    if !reviews::exists(conn, review_id)? {
        return Err(DbError::NotFound("review".into()));
    }
    conn.execute(
        "INSERT INTO comments (user_id, review_id, body, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        rusqlite::params![user_id, review_id, body, now as i64],
    )?;
    get(conn, conn.last_insert_rowid())
}

pub fn get(conn: &Connection, id: CommentId) -> Result<Comment> {
    conn.query_row(
        "SELECT id, user_id, review_id, body, created_at, updated_at
         FROM comments WHERE id = ?1",
        [id],
        comment_from_row,
    )
    .map_err(|e| DbError::or_not_found(e, "comment"))
}

fn get_owned(conn: &Connection, id: CommentId, user_id: &str) -> Result<Comment> {
    let comment = get(conn, id)?;
    if !comment.is_owned_by(user_id) {
        return Err(DbError::Forbidden("comment".into()));
    }
    Ok(comment)
}

/// Comments of a review with author nicknames, oldest first.
pub fn list_for_review(conn: &Connection, review_id: ReviewId) -> Result<Vec<CommentWithAuthor>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.user_id, c.review_id, c.body, c.created_at, c.updated_at,
                COALESCE(u.nickname, '')
         FROM comments c LEFT JOIN users u ON u.id = c.user_id
         WHERE c.review_id = ?1
         ORDER BY c.created_at ASC, c.id ASC",
    )?;

    let rows = stmt
        .query_map([review_id], |row| {
            Ok(CommentWithAuthor {
                comment: comment_from_row(row)?,
                author_nickname: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Edit a comment body. Owner only.
pub fn update(
    conn: &Connection,
    id: CommentId,
    user_id: &str,
    body: &str,
    now: u64,
) -> Result<Comment> {
    let body = normalize_comment_body(body)?;
    get_owned(conn, id, user_id)?;
    conn.execute(
        "UPDATE comments SET body = ?3, updated_at = ?4 WHERE id = ?1 AND user_id = ?2",
        rusqlite::params![id, user_id, body, now as i64],
    )?;
    get(conn, id)
}

/// Delete a comment. Owner only. Returns the deleted row.
pub fn delete(conn: &Connection, id: CommentId, user_id: &str) -> Result<Comment> {
    let comment = get_owned(conn, id, user_id)?;
    conn.execute(
        "DELETE FROM comments WHERE id = ?1 AND user_id = ?2",
        rusqlite::params![id, user_id],
    )?;
    Ok(comment)
}

pub fn count_for_review(conn: &Connection, review_id: ReviewId) -> Result<u64> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM comments WHERE review_id = ?1",
        [review_id],
        |row| row.get(0),
    )?;
    Ok(n as u64)
}
