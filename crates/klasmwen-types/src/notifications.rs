use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{UnknownVariant, UserSummary};

/// What happened to the recipient's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    /// Someone liked one of the recipient's posts
    Like,
    /// Someone commented on one of the recipient's posts
    Comment,
    /// Someone replied to one of the recipient's comments
    Reply,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Like => "LIKE",
            Self::Comment => "COMMENT",
            Self::Reply => "REPLY",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LIKE" => Ok(Self::Like),
            "COMMENT" => Ok(Self::Comment),
            "REPLY" => Ok(Self::Reply),
            other => Err(UnknownVariant {
                kind: "notification kind",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub kind: NotificationKind,
    pub actor: UserSummary,
    pub post_id: i64,
    pub comment_id: Option<i64>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// A notification about to be written. Self-notifications are dropped by
/// [`NewNotification::for_recipient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub recipient_id: String,
    pub actor_id: String,
    pub kind: NotificationKind,
    pub post_id: i64,
    pub comment_id: Option<i64>,
}

impl NewNotification {
    pub fn for_recipient(
        recipient_id: &str,
        actor_id: &str,
        kind: NotificationKind,
        post_id: i64,
        comment_id: Option<i64>,
    ) -> Option<Self> {
        if recipient_id == actor_id {
            return None;
        }
        Some(Self {
            recipient_id: recipient_id.to_string(),
            actor_id: actor_id.to_string(),
            kind,
            post_id,
            comment_id,
        })
    }
}
