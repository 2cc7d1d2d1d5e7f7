//! Forward-only migrations keyed on `PRAGMA user_version`.

use rusqlite::Connection;

use crate::{schema, DbError, Result, SCHEMA_VERSION};

/// Run all pending migrations.
pub fn run(conn: &Connection) -> Result<()> {
    let current_version: u32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(DbError::Sqlite)?;

    if current_version == 0 {
        tracing::info!("Initializing database schema v{SCHEMA_VERSION}");
        conn.execute_batch(schema::SCHEMA_V1)
            .map_err(DbError::Sqlite)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)
            .map_err(DbError::Sqlite)?;
    } else if current_version < SCHEMA_VERSION {
        for version in (current_version + 1)..=SCHEMA_VERSION {
            tracing::info!("Running migration to v{version}");
            run_migration(conn, version)?;
            conn.pragma_update(None, "user_version", version)
                .map_err(DbError::Sqlite)?;
        }
    } else if current_version > SCHEMA_VERSION {
        return Err(DbError::Migration(format!(
            "Database version {current_version} is newer than supported {SCHEMA_VERSION}"
        )));
    }

    Ok(())
}

fn run_migration(_conn: &Connection, version: u32) -> Result<()> {
    Err(DbError::Migration(format!(
        "Unknown migration version: {version}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch("PRAGMA foreign_keys = ON;").expect("pragma");
        conn
    }

    #[test]
    fn test_fresh_migration() {
        let conn = fresh();
        run(&conn).expect("migrate");

        let version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .expect("version");
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_idempotent_migration() {
        let conn = fresh();
        run(&conn).expect("first run");
        run(&conn).expect("second run should be no-op");
    }

    #[test]
    fn test_newer_database_rejected() {
        let conn = fresh();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .expect("bump");
        assert!(matches!(run(&conn), Err(DbError::Migration(_))));
    }

    #[test]
    fn test_tables_created() {
        let conn = fresh();
        run(&conn).expect("migrate");

        for table in [
            "users",
            "credentials",
            "sessions",
            "reviews",
            "review_images",
            "comments",
            "likes",
            "user_devices",
        ] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .expect("query");
            assert_eq!(count, 1, "table {table} missing");
        }
    }

    #[test]
    fn test_rating_check_constraint() {
        let conn = fresh();
        run(&conn).expect("migrate");
        conn.execute(
            "INSERT INTO users (id, nickname, email, created_at, updated_at)
             VALUES ('u', 'n', 'n@example.jp', 0, 0)",
            [],
        )
        .expect("user");

        let result = conn.execute(
            "INSERT INTO reviews (user_id, address_text, rating_location, created_at, updated_at)
             VALUES ('u', '中野', 6, 0, 0)",
            [],
        );
        assert!(result.is_err());
    }
}
