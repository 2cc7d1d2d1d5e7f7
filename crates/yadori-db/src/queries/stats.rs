//! Home screen counters.

use rusqlite::Connection;
use yadori_types::review::{overall_average, Ratings, SiteStats};

use crate::queries::users;
use crate::Result;

/// Total reviews, total users and the mean of every non-null sub-rating.
pub fn site_stats(conn: &Connection) -> Result<SiteStats> {
    let mut stmt = conn.prepare(
        "SELECT rating_location, rating_sunlight, rating_soundproof, rating_environment
         FROM reviews",
    )?;
    let ratings = stmt
        .query_map([], |row| {
            Ok(Ratings::new(row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(SiteStats {
        total_reviews: ratings.len() as u64,
        total_users: users::count(conn)?,
        average_rating: overall_average(&ratings),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::reviews;
    use crate::testutil::{test_db, user};
    use yadori_types::review::ReviewDraft;

    #[test]
    fn test_empty_site() {
        let conn = test_db();
        let stats = site_stats(&conn).expect("stats");
        assert_eq!(stats.total_reviews, 0);
        assert_eq!(stats.total_users, 0);
        assert_eq!(stats.average_rating, None);
    }

    #[test]
    fn test_overall_average_over_all_ratings() {
        let conn = test_db();
        let alice = user(&conn, "alice");
        user(&conn, "bob");
        for ratings in [
            Ratings::new(Some(5), None, None, None),
            Ratings::new(Some(1), Some(3), None, None),
        ] {
            reviews::insert(
                &conn,
                &alice,
                ReviewDraft {
                    address_text: "足立区".to_string(),
                    ratings,
                    ..Default::default()
                },
                1,
            )
            .expect("insert");
        }
        reviews::insert(
            &conn,
            &alice,
            ReviewDraft {
                address_text: "葛飾区".to_string(),
                cons_text: "駅から遠い".to_string(),
                ..Default::default()
            },
            2,
        )
        .expect("insert");

        let stats = site_stats(&conn).expect("stats");
        assert_eq!(stats.total_reviews, 3);
        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.average_rating, Some(3.0));
    }
}
