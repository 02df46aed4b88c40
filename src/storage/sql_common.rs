//! Shared SQL helpers
//!
//! Column conversions and row parsing used by the SQL backend and its
//! transaction type.

use super::StorageResult;
use crate::model::{IdentityLink, User};
use chrono::{DateTime, Utc};
use sqlx::{Row, sqlite::SqliteRow};
use uuid::Uuid;

pub const USER_COLUMNS: &str = "id, name, primary_email, verified, created_at, updated_at";

pub const LINK_COLUMNS: &str =
    "provider, provider_id, user_id, display_name, primary_email, verified, created_at";

/// Convert DateTime to INTEGER (unix timestamp)
#[inline]
pub fn datetime_to_unix(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

/// Parse DateTime from INTEGER (unix timestamp)
#[inline]
pub fn datetime_from_unix(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}

/// Current time in unix milliseconds, the resolution of ephemeral expiry
#[inline]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn parse_user(row: &SqliteRow) -> StorageResult<User> {
    Ok(User {
        id: Uuid::parse_str(&row.try_get::<String, _>("id")?)?,
        name: row.try_get("name")?,
        primary_email: row.try_get("primary_email")?,
        verified: row.try_get::<i64, _>("verified")? != 0,
        created_at: datetime_from_unix(row.try_get("created_at")?),
        updated_at: datetime_from_unix(row.try_get("updated_at")?),
    })
}

pub fn parse_link(row: &SqliteRow) -> StorageResult<IdentityLink> {
    Ok(IdentityLink {
        provider: row.try_get("provider")?,
        provider_id: row.try_get("provider_id")?,
        user_id: Uuid::parse_str(&row.try_get::<String, _>("user_id")?)?,
        display_name: row.try_get("display_name")?,
        primary_email: row.try_get("primary_email")?,
        verified: row.try_get::<i64, _>("verified")? != 0,
        created_at: datetime_from_unix(row.try_get("created_at")?),
    })
}
