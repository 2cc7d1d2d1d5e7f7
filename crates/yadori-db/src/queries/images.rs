//! Review image rows. The files themselves live in the storage bucket.

use rusqlite::Connection;
use yadori_types::review::ReviewImage;
use yadori_types::{ReviewId, ValidationError, MAX_REVIEW_IMAGES};

use crate::{DbError, Result};

/// Record an uploaded image against a review. The count check and the
/// insert are one statement, so a review never ends up with more than
/// `MAX_REVIEW_IMAGES` rows.
pub fn insert(
    conn: &Connection,
    review_id: ReviewId,
    image_url: &str,
    now: u64,
) -> Result<ReviewImage> {
    let inserted = conn
        .execute(
            "INSERT INTO review_images (review_id, image_url, created_at)
             SELECT ?1, ?2, ?3
             WHERE (SELECT COUNT(*) FROM review_images WHERE review_id = ?1) < ?4",
            rusqlite::params![review_id, image_url, now as i64, MAX_REVIEW_IMAGES as i64],
        )
        .map_err(|e| match DbError::or_constraint(e, "review") {
            DbError::Constraint(_) => DbError::NotFound("review".into()),
            other => other,
        })?;
    if inserted == 0 {
        return Err(ValidationError::TooManyImages(MAX_REVIEW_IMAGES).into());
    }
    Ok(ReviewImage {
        id: conn.last_insert_rowid(),
        review_id,
        image_url: image_url.to_string(),
        created_at: now,
    })
}

/// Images of a review in upload order.
pub fn list_for_review(conn: &Connection, review_id: ReviewId) -> Result<Vec<ReviewImage>> {
    let mut stmt = conn.prepare(
        "SELECT id, review_id, image_url, created_at
         FROM review_images WHERE review_id = ?1 ORDER BY id",
    )?;

    let rows = stmt
        .query_map([review_id], |row| {
            Ok(ReviewImage {
                id: row.get(0)?,
                review_id: row.get(1)?,
                image_url: row.get(2)?,
                created_at: row.get::<_, i64>(3)? as u64,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

pub fn count_for_review(conn: &Connection, review_id: ReviewId) -> Result<usize> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM review_images WHERE review_id = ?1",
        [review_id],
        |row| row.get(0),
    )?;
    Ok(n as usize)
}
