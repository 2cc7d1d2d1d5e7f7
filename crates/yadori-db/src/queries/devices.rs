//! Push device registry, keyed by push token.

use rusqlite::Connection;
use yadori_types::social::{DeviceType, UserDevice};

use crate::{DbError, Result};

/// Register (or re-activate) a device token for `user_id`.
///
/// A token already registered to another account moves to this one.
pub fn upsert(
    conn: &Connection,
    push_token: &str,
    user_id: &str,
    device_type: DeviceType,
    platform: &str,
    now: u64,
) -> Result<UserDevice> {
    conn.execute(
        "INSERT INTO user_devices (push_token, user_id, device_type, platform, active, updated_at)
         VALUES (?1, ?2, ?3, ?4, 1, ?5)
         ON CONFLICT(push_token) DO UPDATE SET
            user_id = excluded.user_id,
            device_type = excluded.device_type,
            platform = excluded.platform,
            active = 1,
            updated_at = excluded.updated_at",
        rusqlite::params![push_token, user_id, device_type.as_str(), platform, now as i64],
    )?;
    get(conn, push_token)
}

pub fn get(conn: &Connection, push_token: &str) -> Result<UserDevice> {
    conn.query_row(
        "SELECT push_token, user_id, device_type, platform, active, updated_at
         FROM user_devices WHERE push_token = ?1",
        [push_token],
        |row| {
            let raw: String = row.get(2)?;
            let device_type = DeviceType::parse(&raw).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Text,
                    format!("unknown device type {raw}").into(),
                )
            })?;
            Ok(UserDevice {
                push_token: row.get(0)?,
                user_id: row.get(1)?,
                device_type,
                platform: row.get(3)?,
                active: row.get(4)?,
                updated_at: row.get::<_, i64>(5)? as u64,
            })
        },
    )
    .map_err(|e| DbError::or_not_found(e, "device"))
}

/// Mark the caller's device inactive. Returns whether a row changed.
pub fn deactivate(conn: &Connection, push_token: &str, user_id: &str, now: u64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE user_devices SET active = 0, updated_at = ?3
         WHERE push_token = ?1 AND user_id = ?2",
        rusqlite::params![push_token, user_id, now as i64],
    )?;
    Ok(changed > 0)
}

/// Push tokens of every active device of a user.
pub fn active_tokens_for_user(conn: &Connection, user_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT push_token FROM user_devices
         WHERE user_id = ?1 AND active = 1 ORDER BY updated_at DESC, push_token",
    )?;
    let tokens = stmt
        .query_map([user_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(tokens)
}
