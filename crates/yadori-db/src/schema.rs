//! SQL schema definitions.

/// Complete schema for the v1 database.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Accounts
-- ============================================================

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    nickname TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    bio TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS credentials (
    user_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
    password_hash BLOB NOT NULL,
    salt BLOB NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    token_hash BLOB PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);

-- ============================================================
-- Reviews
-- ============================================================

CREATE TABLE IF NOT EXISTS reviews (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL REFERENCES users(id),
    address_text TEXT NOT NULL,
    latitude REAL,
    longitude REAL,
    rent INTEGER CHECK (rent IS NULL OR rent >= 0),
    layout TEXT NOT NULL DEFAULT '',
    period_lived TEXT NOT NULL DEFAULT '',
    pros_text TEXT NOT NULL DEFAULT '',
    cons_text TEXT NOT NULL DEFAULT '',
    rating_location INTEGER CHECK (rating_location BETWEEN 1 AND 5),
    rating_sunlight INTEGER CHECK (rating_sunlight BETWEEN 1 AND 5),
    rating_soundproof INTEGER CHECK (rating_soundproof BETWEEN 1 AND 5),
    rating_environment INTEGER CHECK (rating_environment BETWEEN 1 AND 5),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_reviews_created ON reviews(created_at);
CREATE INDEX IF NOT EXISTS idx_reviews_user ON reviews(user_id);

CREATE TABLE IF NOT EXISTS review_images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    review_id INTEGER NOT NULL REFERENCES reviews(id) ON DELETE CASCADE,
    image_url TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_review_images_review ON review_images(review_id);

-- ============================================================
-- Social
-- ============================================================

CREATE TABLE IF NOT EXISTS comments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL REFERENCES users(id),
    review_id INTEGER NOT NULL REFERENCES reviews(id) ON DELETE CASCADE,
    body TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_comments_review ON comments(review_id, created_at);

CREATE TABLE IF NOT EXISTS likes (
    user_id TEXT NOT NULL REFERENCES users(id),
    review_id INTEGER NOT NULL REFERENCES reviews(id) ON DELETE CASCADE,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, review_id)
);

CREATE INDEX IF NOT EXISTS idx_likes_review ON likes(review_id);

-- ============================================================
-- Push devices
-- ============================================================

CREATE TABLE IF NOT EXISTS user_devices (
    push_token TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id),
    device_type TEXT NOT NULL CHECK (device_type IN ('ios', 'android', 'web')),
    platform TEXT NOT NULL DEFAULT '',
    active INTEGER NOT NULL DEFAULT 1,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_user_devices_user ON user_devices(user_id, active);
"#;
