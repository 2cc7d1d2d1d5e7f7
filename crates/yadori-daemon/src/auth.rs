//! Email and password accounts with opaque session tokens.
//!
//! Passwords are stretched with Argon2id under a random 16-byte salt.
//! Session tokens are 32 random bytes handed to the client as hex; the
//! store only ever sees their BLAKE3 hash.

use std::time::Duration;

use argon2::{Algorithm, Argon2, Params, Version};
use rusqlite::Connection;
use serde::Serialize;
use tracing::info;
use yadori_db::queries::{credentials, sessions, users};
use yadori_db::DbError;
use yadori_types::user::{validate_nickname, User};
use yadori_types::{ErrorKind, ValidationError};

pub const MIN_PASSWORD_LEN: usize = 6;

/// Argon2id cost: 19 MiB, 2 passes, 1 lane.
pub const PASSWORD_M_COST: u32 = 19 * 1024;
pub const PASSWORD_T_COST: u32 = 2;
pub const PASSWORD_P_COST: u32 = 1;
pub const PASSWORD_HASH_LEN: usize = 32;
pub const SALT_LEN: usize = 16;
pub const TOKEN_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid email address")]
    InvalidEmail,

    #[error("password must be at least {MIN_PASSWORD_LEN} characters")]
    WeakPassword,

    #[error("email already registered")]
    EmailTaken,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("not signed in")]
    NotSignedIn,

    /// Unknown, expired or signed-out token.
    #[error("session expired")]
    SessionExpired,

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::InvalidEmail | AuthError::WeakPassword | AuthError::Validation(_) => {
                ErrorKind::Validation
            }
            AuthError::EmailTaken => ErrorKind::Conflict,
            AuthError::InvalidCredentials | AuthError::NotSignedIn | AuthError::SessionExpired => {
                ErrorKind::Auth
            }
            AuthError::Hash(_) => ErrorKind::Internal,
            AuthError::Db(e) => e.kind(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;

/// A freshly opened session.
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    /// Bearer token; shown once, only its hash is stored.
    pub token: String,
    pub user: User,
    pub expires_at: u64,
}

/// Lower-case and sanity-check an email address.
pub fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty() && !domain.is_empty() && !domain.contains('@') =>
        {
            Ok(email)
        }
        _ => Err(AuthError::InvalidEmail),
    }
}

/// Argon2id of `password` under `salt`.
pub fn hash_password(password: &str, salt: &[u8]) -> Result<[u8; PASSWORD_HASH_LEN]> {
    let params = Params::new(
        PASSWORD_M_COST,
        PASSWORD_T_COST,
        PASSWORD_P_COST,
        Some(PASSWORD_HASH_LEN),
    )
    .map_err(|e| AuthError::Hash(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut output = [0u8; PASSWORD_HASH_LEN];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut output)
        .map_err(|e| AuthError::Hash(e.to_string()))?;
    Ok(output)
}

/// Storage key of a session token.
pub fn token_hash(token: &str) -> [u8; 32] {
    *blake3::hash(token.as_bytes()).as_bytes()
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut bytes);
    bytes
}

/// Issue a token for `user` and store its hash.
pub fn open_session(conn: &Connection, user: User, ttl: Duration, now: u64) -> Result<AuthSession> {
    let token = hex::encode(random_bytes::<TOKEN_LEN>());
    let expires_at = now + ttl.as_secs();
    sessions::insert(conn, &token_hash(&token), &user.id, now, expires_at)?;

    let purged = sessions::purge_expired(conn, now)?;
    if purged > 0 {
        tracing::debug!(purged, "expired sessions removed");
    }

    Ok(AuthSession {
        token,
        user,
        expires_at,
    })
}

/// A salted password hash, ready to store.
pub struct PasswordCredential {
    hash: [u8; PASSWORD_HASH_LEN],
    salt: [u8; SALT_LEN],
}

/// Check the password rules and stretch the password under a fresh salt.
/// Runs Argon2; call it without holding the database lock.
pub fn new_credential(password: &str) -> Result<PasswordCredential> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::WeakPassword);
    }
    let salt = random_bytes::<SALT_LEN>();
    let hash = hash_password(password, &salt)?;
    Ok(PasswordCredential { hash, salt })
}

/// Create an account with a prepared credential and sign it in.
///
/// Without a nickname the profile gets the default one derived from the
/// email.
pub fn sign_up(
    conn: &Connection,
    email: &str,
    credential: &PasswordCredential,
    nickname: Option<&str>,
    ttl: Duration,
    now: u64,
) -> Result<AuthSession> {
    let email = normalize_email(email)?;
    let nickname = nickname
        .filter(|n| !n.trim().is_empty())
        .map(validate_nickname)
        .transpose()?;
    if users::find_by_email(conn, &email)?.is_some() {
        return Err(AuthError::EmailTaken);
    }

    let user_id = hex::encode(random_bytes::<16>());
    let tx = conn.unchecked_transaction().map_err(DbError::from)?;
    let user = match nickname {
        Some(nickname) => users::insert(&tx, &user_id, &email, &nickname, now),
        None => users::ensure(&tx, &user_id, &email, now),
    }
    .map_err(|e| match e {
        DbError::Constraint(_) => AuthError::EmailTaken,
        other => AuthError::Db(other),
    })?;
    credentials::insert(&tx, &user_id, &credential.hash, &credential.salt, now)?;
    tx.commit().map_err(DbError::from)?;

    info!(user_id = %user.id, "account created");
    open_session(conn, user, ttl, now)
}

/// The account behind an email with its stored hash.
pub struct StoredCredential {
    pub user: User,
    hash: [u8; PASSWORD_HASH_LEN],
    salt: Vec<u8>,
}

impl StoredCredential {
    /// Compare `password` against the stored hash. Runs Argon2; call it
    /// without holding the database lock.
    pub fn verify(&self, password: &str) -> Result<()> {
        let computed = hash_password(password, &self.salt)?;
        // blake3::Hash equality is constant time.
        if blake3::Hash::from(self.hash) != blake3::Hash::from(computed) {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(())
    }
}

/// Find the credential to check a sign-in against. Unknown emails are
/// reported as bad credentials.
pub fn lookup(conn: &Connection, email: &str) -> Result<StoredCredential> {
    let email = normalize_email(email).map_err(|_| AuthError::InvalidCredentials)?;
    let user = users::find_by_email(conn, &email)?.ok_or(AuthError::InvalidCredentials)?;
    let credential = match credentials::get(conn, &user.id) {
        Ok(c) => c,
        Err(DbError::NotFound(_)) => return Err(AuthError::InvalidCredentials),
        Err(e) => return Err(e.into()),
    };
    let hash = credential
        .password_hash
        .as_slice()
        .try_into()
        .map_err(|_| AuthError::Hash("stored hash has the wrong length".into()))?;
    Ok(StoredCredential {
        user,
        hash,
        salt: credential.salt,
    })
}

/// User behind a live session token.
pub fn resolve(conn: &Connection, token: &str, now: u64) -> Result<User> {
    let session = match sessions::get_live(conn, &token_hash(token), now) {
        Ok(s) => s,
        Err(DbError::NotFound(_)) => return Err(AuthError::SessionExpired),
        Err(e) => return Err(e.into()),
    };
    Ok(users::get(conn, &session.user_id)?)
}

/// End a session. Returns the user it belonged to, if it was live.
pub fn sign_out(conn: &Connection, token_hash: &[u8; 32], now: u64) -> Result<Option<String>> {
    let owner = match sessions::get_live(conn, token_hash, now) {
        Ok(s) => Some(s.user_id),
        Err(DbError::NotFound(_)) => None,
        Err(e) => return Err(e.into()),
    };
    sessions::delete(conn, token_hash)?;
    if let Some(user_id) = &owner {
        info!(user_id = %user_id, "signed out");
    }
    Ok(owner)
}
