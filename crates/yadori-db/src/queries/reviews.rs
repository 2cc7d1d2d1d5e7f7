//! Review queries, listings and the joined detail read.

use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension};
use yadori_types::review::{
    Ratings, Review, ReviewDetail, ReviewDraft, ReviewPage, ReviewPatch, ReviewQuery, ReviewSort,
    ReviewSummary,
};
use yadori_types::ReviewId;

use crate::queries::{comments, images, likes};
use crate::{DbError, Result};

/// Page size when the caller gives none.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: u32 = 100;

/// SQL form of `Ratings::average`: mean of the non-null sub-ratings, NULL
/// when all four are NULL. Used only for filtering and ordering.
const AVG_RATING_SQL: &str = "(CAST(COALESCE(r.rating_location, 0) + COALESCE(r.rating_sunlight, 0)
        + COALESCE(r.rating_soundproof, 0) + COALESCE(r.rating_environment, 0) AS REAL)
    / NULLIF((r.rating_location IS NOT NULL) + (r.rating_sunlight IS NOT NULL)
        + (r.rating_soundproof IS NOT NULL) + (r.rating_environment IS NOT NULL), 0))";

const REVIEW_COLUMNS: &str = "r.id, r.user_id, r.address_text, r.latitude, r.longitude, r.rent,
    r.layout, r.period_lived, r.pros_text, r.cons_text,
    r.rating_location, r.rating_sunlight, r.rating_soundproof, r.rating_environment,
    r.created_at, r.updated_at";

/// Number of columns in `REVIEW_COLUMNS`.
const REVIEW_WIDTH: usize = 16;

fn review_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Review> {
    Ok(Review {
        id: row.get(0)?,
        user_id: row.get(1)?,
        address_text: row.get(2)?,
        latitude: row.get(3)?,
        longitude: row.get(4)?,
        rent: row.get(5)?,
        layout: row.get(6)?,
        period_lived: row.get(7)?,
        pros_text: row.get(8)?,
        cons_text: row.get(9)?,
        ratings: Ratings {
            rating_location: row.get(10)?,
            rating_sunlight: row.get(11)?,
            rating_soundproof: row.get(12)?,
            rating_environment: row.get(13)?,
        },
        created_at: row.get::<_, i64>(14)? as u64,
        updated_at: row.get::<_, i64>(15)? as u64,
    })
}

/// Insert a review for `user_id`. The draft is validated first.
pub fn insert(conn: &Connection, user_id: &str, draft: ReviewDraft, now: u64) -> Result<Review> {
    let d = draft.normalized()?;
    conn.execute(
        "INSERT INTO reviews (user_id, address_text, latitude, longitude, rent, layout,
            period_lived, pros_text, cons_text, rating_location, rating_sunlight,
            rating_soundproof, rating_environment, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
        rusqlite::params![
            user_id,
            d.address_text,
            d.latitude,
            d.longitude,
            d.rent,
            d.layout,
            d.period_lived,
            d.pros_text,
            d.cons_text,
            d.ratings.rating_location,
            d.ratings.rating_sunlight,
            d.ratings.rating_soundproof,
            d.ratings.rating_environment,
            now as i64,
        ],
    )
    .map_err(|e| DbError::or_constraint(e, "review"))?;
    get(conn, conn.last_insert_rowid())
}

/// Get a review row by id.
pub fn get(conn: &Connection, id: ReviewId) -> Result<Review> {
    conn.query_row(
        &format!("SELECT {REVIEW_COLUMNS} FROM reviews r WHERE r.id = ?1"),
        [id],
        review_from_row,
    )
    .map_err(|e| DbError::or_not_found(e, "review"))
}

pub fn exists(conn: &Connection, id: ReviewId) -> Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM reviews WHERE id = ?1", [id], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

/// Load a review and check that `user_id` owns it.
pub fn get_owned(conn: &Connection, id: ReviewId, user_id: &str) -> Result<Review> {
    let review = get(conn, id)?;
    if !review.is_owned_by(user_id) {
        return Err(DbError::Forbidden("review".into()));
    }
    Ok(review)
}

/// Apply a partial edit. Owner only; the merged result is re-validated.
pub fn update(
    conn: &Connection,
    id: ReviewId,
    user_id: &str,
    patch: ReviewPatch,
    now: u64,
) -> Result<Review> {
    let current = get_owned(conn, id, user_id)?;
    let d = patch.apply(&current).normalized()?;
    let changed = conn.execute(
        "UPDATE reviews SET address_text = ?3, latitude = ?4, longitude = ?5, rent = ?6,
            layout = ?7, period_lived = ?8, pros_text = ?9, cons_text = ?10,
            rating_location = ?11, rating_sunlight = ?12, rating_soundproof = ?13,
            rating_environment = ?14, updated_at = ?15
         WHERE id = ?1 AND user_id = ?2",
        rusqlite::params![
            id,
            user_id,
            d.address_text,
            d.latitude,
            d.longitude,
            d.rent,
            d.layout,
            d.period_lived,
            d.pros_text,
            d.cons_text,
            d.ratings.rating_location,
            d.ratings.rating_sunlight,
            d.ratings.rating_soundproof,
            d.ratings.rating_environment,
            now as i64,
        ],
    )?;
    if changed == 0 {
        return Err(DbError::NotFound("review".into()));
    }
    get(conn, id)
}

/// Delete a review the caller owns. Images, comments and likes cascade.
///
/// Returns the deleted row.
pub fn delete(conn: &Connection, id: ReviewId, user_id: &str) -> Result<Review> {
    let review = get_owned(conn, id, user_id)?;
    conn.execute(
        "DELETE FROM reviews WHERE id = ?1 AND user_id = ?2",
        rusqlite::params![id, user_id],
    )?;
    Ok(review)
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` substring pattern.
fn like_pattern(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

fn order_clause(sort: ReviewSort) -> String {
    match sort {
        ReviewSort::Newest => "r.created_at DESC, r.id DESC".to_string(),
        ReviewSort::Oldest => "r.created_at ASC, r.id ASC".to_string(),
        ReviewSort::RentLow => "r.rent IS NULL, r.rent ASC, r.id DESC".to_string(),
        ReviewSort::RentHigh => "r.rent IS NULL, r.rent DESC, r.id DESC".to_string(),
        ReviewSort::Rating => {
            format!("{AVG_RATING_SQL} IS NULL, {AVG_RATING_SQL} DESC, r.created_at DESC, r.id DESC")
        }
    }
}

/// Paged, filtered, sorted listing with per-review aggregates.
pub fn list(conn: &Connection, query: &ReviewQuery) -> Result<ReviewPage> {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Value> = Vec::new();

    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        params.push(Value::Text(like_pattern(search)));
        clauses.push(format!("r.address_text LIKE ?{} ESCAPE '\\'", params.len()));
    }
    if let Some(layout) = query.layout.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        params.push(Value::Text(like_pattern(layout)));
        clauses.push(format!("r.layout LIKE ?{} ESCAPE '\\'", params.len()));
    }
    if let Some(min) = query.min_rent {
        params.push(Value::Integer(min));
        clauses.push(format!("r.rent >= ?{}", params.len()));
    }
    if let Some(max) = query.max_rent {
        params.push(Value::Integer(max));
        clauses.push(format!("r.rent <= ?{}", params.len()));
    }
    if let Some(min) = query.min_rating {
        params.push(Value::Real(min));
        clauses.push(format!("{AVG_RATING_SQL} >= ?{}", params.len()));
    }
    if let Some(user_id) = &query.user_id {
        params.push(Value::Text(user_id.clone()));
        clauses.push(format!("r.user_id = ?{}", params.len()));
    }
    match query.has_images {
        Some(true) => clauses
            .push("EXISTS (SELECT 1 FROM review_images i WHERE i.review_id = r.id)".to_string()),
        Some(false) => clauses.push(
            "NOT EXISTS (SELECT 1 FROM review_images i WHERE i.review_id = r.id)".to_string(),
        ),
        None => {}
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM reviews r {where_sql}"),
        rusqlite::params_from_iter(params.iter()),
        |row| row.get(0),
    )?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0);
    params.push(Value::Integer(i64::from(limit)));
    let limit_idx = params.len();
    params.push(Value::Integer(i64::from(offset)));
    let offset_idx = params.len();

    let sql = format!(
        "SELECT {REVIEW_COLUMNS},
            COALESCE(u.nickname, ''),
            (SELECT i.image_url FROM review_images i
             WHERE i.review_id = r.id ORDER BY i.id LIMIT 1),
            (SELECT COUNT(*) FROM likes l WHERE l.review_id = r.id),
            (SELECT COUNT(*) FROM comments c WHERE c.review_id = r.id)
         FROM reviews r LEFT JOIN users u ON u.id = r.user_id
         {where_sql}
         ORDER BY {order}
         LIMIT ?{limit_idx} OFFSET ?{offset_idx}",
        order = order_clause(query.sort),
    );

    let mut stmt = conn.prepare(&sql)?;
    let reviews = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            let review = review_from_row(row)?;
            let average_rating = review.average_rating();
            Ok(ReviewSummary {
                author_nickname: row.get(REVIEW_WIDTH)?,
                first_image_url: row.get(REVIEW_WIDTH + 1)?,
                like_count: row.get::<_, i64>(REVIEW_WIDTH + 2)? as u64,
                comment_count: row.get::<_, i64>(REVIEW_WIDTH + 3)? as u64,
                average_rating,
                review,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(ReviewPage {
        reviews,
        total: total as u64,
    })
}

/// One review with its images, comments, like count and the viewer's like.
pub fn get_detail(conn: &Connection, id: ReviewId, viewer: Option<&str>) -> Result<ReviewDetail> {
    let (review, author_nickname) = conn
        .query_row(
            &format!(
                "SELECT {REVIEW_COLUMNS}, COALESCE(u.nickname, '')
                 FROM reviews r LEFT JOIN users u ON u.id = r.user_id
                 WHERE r.id = ?1"
            ),
            [id],
            |row| Ok((review_from_row(row)?, row.get::<_, String>(REVIEW_WIDTH)?)),
        )
        .map_err(|e| DbError::or_not_found(e, "review"))?;

    let liked_by_viewer = match viewer {
        Some(user_id) => likes::is_liked(conn, id, user_id)?,
        None => false,
    };

    Ok(ReviewDetail {
        author_nickname,
        images: images::list_for_review(conn, id)?,
        comments: comments::list_for_review(conn, id)?,
        like_count: likes::count(conn, id)?,
        liked_by_viewer,
        average_rating: review.average_rating(),
        review,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{review, test_db, user};

    fn draft(address: &str, rent: Option<i64>, ratings: Ratings) -> ReviewDraft {
        ReviewDraft {
            address_text: address.to_string(),
            rent,
            ratings,
            pros_text: "駅が近い".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_insert_and_get() {
        let conn = test_db();
        let alice = user(&conn, "alice");
        let r = insert(
            &conn,
            &alice,
            draft(" 世田谷区三軒茶屋 ", Some(90_000), Ratings::new(Some(4), None, Some(2), None)),
            100,
        )
        .expect("insert");

        let loaded = get(&conn, r.id).expect("get");
        assert_eq!(loaded.address_text, "世田谷区三軒茶屋");
        assert_eq!(loaded.rent, Some(90_000));
        assert_eq!(loaded.average_rating(), Some(3.0));
        assert!(loaded.is_owned_by(&alice));
    }

    #[test]
    fn test_insert_validates() {
        let conn = test_db();
        let alice = user(&conn, "alice");
        let empty = ReviewDraft {
            address_text: "新宿".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            insert(&conn, &alice, empty, 1),
            Err(DbError::Validation(_))
        ));
    }

    #[test]
    fn test_update_owner_only() {
        let conn = test_db();
        let alice = user(&conn, "alice");
        let bob = user(&conn, "bob");
        let r = review(&conn, &alice, "練馬区", 10);

        let patch = ReviewPatch {
            rent: Some(Some(60_000)),
            ..Default::default()
        };
        let result = update(&conn, r.id, &bob, patch.clone(), 11);
        assert!(matches!(result, Err(DbError::Forbidden(_))));

        let updated = update(&conn, r.id, &alice, patch, 12).expect("owner update");
        assert_eq!(updated.rent, Some(60_000));
        assert_eq!(updated.address_text, "練馬区");
        assert_eq!(updated.updated_at, 12);
    }

    #[test]
    fn test_update_missing_review() {
        let conn = test_db();
        let alice = user(&conn, "alice");
        let result = update(&conn, 999, &alice, ReviewPatch::default(), 1);
        assert!(matches!(result, Err(DbError::NotFound(_))));
    }

    #[test]
    fn test_delete_cascades() {
        let conn = test_db();
        let alice = user(&conn, "alice");
        let bob = user(&conn, "bob");
        let r = review(&conn, &alice, "北区", 10);
        images::insert(&conn, r.id, "http://x/1.jpg", 11).expect("image");
        comments::insert(&conn, r.id, &bob, "いいですね", 12).expect("comment");
        likes::set(&conn, r.id, &bob, true).expect("like");

        assert!(matches!(
            delete(&conn, r.id, &bob),
            Err(DbError::Forbidden(_))
        ));
        delete(&conn, r.id, &alice).expect("delete");

        assert!(!exists(&conn, r.id).expect("exists"));
        assert_eq!(images::count_for_review(&conn, r.id).expect("count"), 0);
        assert_eq!(comments::count_for_review(&conn, r.id).expect("count"), 0);
        assert_eq!(likes::count(&conn, r.id).expect("count"), 0);
    }

    #[test]
    fn test_list_newest_first_with_aggregates() {
        let conn = test_db();
        let alice = user(&conn, "alice");
        let bob = user(&conn, "bob");
        let old = review(&conn, &alice, "板橋区", 10);
        let new = review(&conn, &alice, "豊島区", 20);
        images::insert(&conn, new.id, "http://x/a.jpg", 21).expect("image");
        images::insert(&conn, new.id, "http://x/b.jpg", 22).expect("image");
        likes::set(&conn, new.id, &bob, true).expect("like");
        comments::insert(&conn, new.id, &bob, "参考になります", 23).expect("comment");

        let page = list(&conn, &ReviewQuery::default()).expect("list");
        assert_eq!(page.total, 2);
        assert_eq!(page.reviews[0].review.id, new.id);
        assert_eq!(page.reviews[1].review.id, old.id);

        let first = &page.reviews[0];
        assert_eq!(first.author_nickname, "alice");
        assert_eq!(first.first_image_url.as_deref(), Some("http://x/a.jpg"));
        assert_eq!(first.like_count, 1);
        assert_eq!(first.comment_count, 1);
        assert_eq!(first.average_rating, Some(3.0));
    }

    #[test]
    fn test_list_search_and_paging() {
        let conn = test_db();
        let alice = user(&conn, "alice");
        for i in 0..5 {
            review(&conn, &alice, &format!("Shibuya {i}"), 10 + i);
        }
        review(&conn, &alice, "中野区", 100);

        let page = list(
            &conn,
            &ReviewQuery {
                search: Some("shibuya".to_string()),
                limit: Some(2),
                offset: Some(1),
                sort: ReviewSort::Oldest,
                ..Default::default()
            },
        )
        .expect("list");
        assert_eq!(page.total, 5);
        assert_eq!(page.reviews.len(), 2);
        assert_eq!(page.reviews[0].review.address_text, "Shibuya 1");
    }

    #[test]
    fn test_list_search_escapes_wildcards() {
        let conn = test_db();
        let alice = user(&conn, "alice");
        review(&conn, &alice, "100%マンション", 1);
        review(&conn, &alice, "100円ハイツ", 2);

        let page = list(
            &conn,
            &ReviewQuery {
                search: Some("100%".to_string()),
                ..Default::default()
            },
        )
        .expect("list");
        assert_eq!(page.total, 1);
    }

    #[test]
    fn test_list_filters_and_rent_sort() {
        let conn = test_db();
        let alice = user(&conn, "alice");
        let post = |address: &str, rent: Option<i64>, ratings: Ratings, now: u64| {
            insert(&conn, &alice, draft(address, rent, ratings), now).expect("insert")
        };
        let cheap = post("A", Some(50_000), Ratings::new(Some(2), None, None, None), 1);
        let mid = post("B", Some(80_000), Ratings::new(Some(5), Some(4), None, None), 2);
        let unknown = post("C", None, Ratings::default(), 3);
        let pricey = post("D", Some(150_000), Ratings::new(Some(4), None, None, None), 4);

        let ids = |q: ReviewQuery| -> Vec<ReviewId> {
            list(&conn, &q)
                .expect("list")
                .reviews
                .iter()
                .map(|s| s.review.id)
                .collect()
        };

        assert_eq!(
            ids(ReviewQuery {
                sort: ReviewSort::RentLow,
                ..Default::default()
            }),
            vec![cheap.id, mid.id, pricey.id, unknown.id]
        );
        assert_eq!(
            ids(ReviewQuery {
                sort: ReviewSort::RentHigh,
                ..Default::default()
            }),
            vec![pricey.id, mid.id, cheap.id, unknown.id]
        );
        assert_eq!(
            ids(ReviewQuery {
                min_rent: Some(60_000),
                max_rent: Some(100_000),
                ..Default::default()
            }),
            vec![mid.id]
        );
        assert_eq!(
            ids(ReviewQuery {
                sort: ReviewSort::Rating,
                ..Default::default()
            }),
            vec![mid.id, pricey.id, cheap.id, unknown.id]
        );
        assert_eq!(
            ids(ReviewQuery {
                min_rating: Some(4.0),
                sort: ReviewSort::Oldest,
                ..Default::default()
            }),
            vec![mid.id, pricey.id]
        );
    }

    #[test]
    fn test_list_has_images_and_author() {
        let conn = test_db();
        let alice = user(&conn, "alice");
        let bob = user(&conn, "bob");
        let with = review(&conn, &alice, "A", 1);
        let without = review(&conn, &bob, "B", 2);
        images::insert(&conn, with.id, "http://x/1.jpg", 3).expect("image");

        let page = list(
            &conn,
            &ReviewQuery {
                has_images: Some(false),
                ..Default::default()
            },
        )
        .expect("list");
        assert_eq!(page.reviews.len(), 1);
        assert_eq!(page.reviews[0].review.id, without.id);

        let page = list(
            &conn,
            &ReviewQuery {
                user_id: Some(alice.clone()),
                ..Default::default()
            },
        )
        .expect("list");
        assert_eq!(page.total, 1);
        assert_eq!(page.reviews[0].review.id, with.id);
    }

    #[test]
    fn test_list_limit_clamped() {
        let conn = test_db();
        let alice = user(&conn, "alice");
        for i in 0..3 {
            review(&conn, &alice, "X", i);
        }
        let page = list(
            &conn,
            &ReviewQuery {
                limit: Some(0),
                ..Default::default()
            },
        )
        .expect("list");
        assert_eq!(page.reviews.len(), 1);
        assert_eq!(page.total, 3);
    }

    #[test]
    fn test_detail_nests_images_and_comments() {
        let conn = test_db();
        let alice = user(&conn, "alice");
        let bob = user(&conn, "bob");
        let r = review(&conn, &alice, "文京区", 10);
        images::insert(&conn, r.id, "http://x/2.jpg", 11).expect("image");
        images::insert(&conn, r.id, "http://x/1.jpg", 11).expect("image");
        comments::insert(&conn, r.id, &bob, "second", 30).expect("comment");
        comments::insert(&conn, r.id, &alice, "first", 20).expect("comment");
        likes::set(&conn, r.id, &bob, true).expect("like");

        let detail = get_detail(&conn, r.id, Some(&bob)).expect("detail");
        assert_eq!(detail.author_nickname, "alice");
        assert_eq!(detail.images.len(), 2);
        assert_eq!(detail.images[0].image_url, "http://x/2.jpg");
        assert_eq!(detail.comments[0].comment.body, "first");
        assert_eq!(detail.comments[0].author_nickname, "alice");
        assert_eq!(detail.comments[1].author_nickname, "bob");
        assert_eq!(detail.like_count, 1);
        assert!(detail.liked_by_viewer);

        let anonymous = get_detail(&conn, r.id, None).expect("detail");
        assert!(!anonymous.liked_by_viewer);

        assert!(matches!(
            get_detail(&conn, 999, None),
            Err(DbError::NotFound(_))
        ));
    }
}
