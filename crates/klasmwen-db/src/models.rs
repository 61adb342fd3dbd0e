//! Row types and row-mapping helpers. `UserRow` keeps the password hash and
//! therefore never leaves the server; everything else maps straight onto the
//! klasmwen-types models.

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use tracing::warn;

use klasmwen_types::models::{Comment, Role, UnknownVariant, User, UserSummary};

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub role: Role,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: String,
}

impl UserRow {
    pub fn into_user(self) -> User {
        User {
            created_at: parse_timestamp(&self.created_at),
            id: self.id,
            username: self.username,
            role: self.role,
            bio: self.bio,
            avatar_url: self.avatar_url,
        }
    }
}

/// A comment about to be inserted, with its thread linkage already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub post_id: i64,
    pub author_id: String,
    pub content: String,
    pub parent_id: Option<i64>,
    pub mentioned_user_id: Option<String>,
}

impl NewComment {
    pub fn root(post_id: i64, author_id: &str, content: &str) -> Self {
        Self {
            post_id,
            author_id: author_id.to_string(),
            content: content.to_string(),
            parent_id: None,
            mentioned_user_id: None,
        }
    }

    /// Reply to `parent`. Replies are stored one level deep: answering a root
    /// comment makes a first-level reply, answering a reply files the new
    /// comment under the same root and mentions the replied-to author.
    pub fn reply_to(parent: &Comment, author_id: &str, content: &str) -> Self {
        let (parent_id, mentioned_user_id) = match parent.parent_id {
            None => (parent.id, None),
            Some(root_id) => (root_id, Some(parent.author.id.clone())),
        };
        Self {
            post_id: parent.post_id,
            author_id: author_id.to_string(),
            content: content.to_string(),
            parent_id: Some(parent_id),
            mentioned_user_id,
        }
    }
}

/// SQLite writes `YYYY-MM-DDTHH:MM:SS.sssZ` through our column defaults; older
/// rows or manual inserts may use `datetime('now')` format without a zone.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

/// Same layout as the column defaults, so stored and bound values compare
/// lexicographically in time order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_enum<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = UnknownVariant>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Reads `id, username, avatar_url` starting at `idx`.
pub(crate) fn user_summary(row: &Row<'_>, idx: usize) -> rusqlite::Result<UserSummary> {
    Ok(UserSummary {
        id: row.get(idx)?,
        username: row.get(idx + 1)?,
        avatar_url: row.get(idx + 2)?,
    })
}

/// Like [`user_summary`], for LEFT JOINed users that may be absent.
pub(crate) fn optional_user_summary(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<UserSummary>> {
    let id: Option<String> = row.get(idx)?;
    match id {
        Some(id) => Ok(Some(UserSummary {
            id,
            username: row.get(idx + 1)?,
            avatar_url: row.get(idx + 2)?,
        })),
        None => Ok(None),
    }
}

pub(crate) fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    Ok(parse_timestamp(&raw))
}

pub(crate) fn optional_timestamp(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    Ok(raw.as_deref().map(parse_timestamp))
}
