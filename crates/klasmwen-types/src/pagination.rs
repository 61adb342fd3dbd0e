//! Page envelopes and opaque cursor tokens.
//!
//! Feeds use cursor pagination ([`CursorPage`]); the moderation queue uses
//! offset pagination ([`OffsetPage`]) because moderators need exact totals
//! and page jumps. The two are deliberately separate types.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 60;
pub const MAX_OFFSET_LIMIT: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaginationError {
    #[error("cursor is not a valid pagination token")]
    InvalidCursor,
    #[error("cursor does not reference an existing record")]
    UnknownCursor,
    #[error("ordering terms must share a single direction")]
    MixedDirections,
    #[error("cursor key could not be encoded: {0}")]
    Encode(String),
}

/// Opaque position marker handed to clients.
///
/// Internally this is base64url (unpadded) over the JSON form of a key such
/// as [`IdKey`] or [`UserPostKey`]; clients must echo it back untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn encode<K: Serialize>(key: &K) -> Result<Self, PaginationError> {
        let json = serde_json::to_vec(key).map_err(|e| PaginationError::Encode(e.to_string()))?;
        Ok(Self(URL_SAFE_NO_PAD.encode(json)))
    }

    pub fn decode<K: DeserializeOwned>(&self) -> Result<K, PaginationError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(self.0.as_bytes())
            .map_err(|_| PaginationError::InvalidCursor)?;
        serde_json::from_slice(&bytes).map_err(|_| PaginationError::InvalidCursor)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Cursor {
    fn from(token: String) -> Self {
        Self(token)
    }
}

/// Single-field cursor key: an integer primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdKey(pub i64);

/// Compound cursor key matching the `(user_id, post_id)` primary key of
/// likes and bookmarks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPostKey {
    pub user_id: String,
    pub post_id: i64,
}

#[derive(Debug, Clone, Default)]
pub struct PageOptions {
    pub limit: u32,
    pub cursor: Option<Cursor>,
}

impl PageOptions {
    pub fn new(limit: u32, cursor: Option<Cursor>) -> Self {
        Self { limit, cursor }
    }

    pub fn first(limit: u32) -> Self {
        Self { limit, cursor: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPagination {
    pub has_more: bool,
    pub next_cursor: Option<Cursor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_items: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorPage<T> {
    pub data: Vec<T>,
    pub pagination: CursorPagination,
}

impl<T> CursorPage<T> {
    /// Builds a page from a fetch that asked for `limit + 1` rows.
    ///
    /// The extra row only signals that another page exists; it is dropped and
    /// the cursor points at the last row kept.
    pub fn from_overfetch(
        mut rows: Vec<T>,
        limit: u32,
        cursor_of: impl Fn(&T) -> Result<Cursor, PaginationError>,
    ) -> Result<Self, PaginationError> {
        let limit = limit as usize;
        let has_more = rows.len() > limit;
        rows.truncate(limit);
        let next_cursor = match rows.last() {
            Some(last) if has_more => Some(cursor_of(last)?),
            _ => None,
        };

        Ok(Self {
            data: rows,
            pagination: CursorPagination {
                has_more,
                next_cursor,
                total_items: None,
            },
        })
    }

    pub fn with_total(mut self, total: i64) -> Self {
        self.pagination.total_items = Some(total);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OffsetPagination {
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_previous: bool,
}

impl OffsetPagination {
    pub fn new(total: i64, page: u32, limit: u32) -> Self {
        let limit = limit.max(1);
        let page = page.max(1);
        let total_pages = (total.max(0) as u64).div_ceil(limit as u64) as u32;
        Self {
            total,
            page,
            limit,
            total_pages,
            has_next: page < total_pages,
            has_previous: page > 1,
        }
    }

    /// Row offset of the first item on `page` (1-based).
    pub fn offset(page: u32, limit: u32) -> u64 {
        (page.max(1) as u64 - 1) * limit as u64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffsetPage<T> {
    pub data: Vec<T>,
    pub pagination: OffsetPagination,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id_cursor(id: &i64) -> Result<Cursor, PaginationError> {
        Cursor::encode(&IdKey(*id))
    }

    #[test]
    fn overfetch_sets_has_more_and_cursor() {
        let page = CursorPage::from_overfetch(vec![9, 8, 7, 6], 3, id_cursor).unwrap();
        assert_eq!(page.data, vec![9, 8, 7]);
        assert!(page.pagination.has_more);
        let next = page.pagination.next_cursor.unwrap();
        assert_eq!(next.decode::<IdKey>().unwrap(), IdKey(7));
    }

    #[test]
    fn exact_fit_has_no_next_cursor() {
        let page = CursorPage::from_overfetch(vec![3, 2, 1], 3, id_cursor).unwrap();
        assert_eq!(page.data.len(), 3);
        assert!(!page.pagination.has_more);
        assert!(page.pagination.next_cursor.is_none());
    }

    #[test]
    fn empty_page_envelope() {
        let page = CursorPage::from_overfetch(Vec::<i64>::new(), 10, id_cursor).unwrap();
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "data": [], "pagination": { "hasMore": false, "nextCursor": null } })
        );
    }

    #[test]
    fn total_items_is_serialized_when_present() {
        let page = CursorPage::from_overfetch(vec![1], 5, id_cursor).unwrap().with_total(42);
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["pagination"]["totalItems"], 42);
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        let garbage = Cursor::from("%%not-base64%%".to_string());
        assert_eq!(garbage.decode::<IdKey>(), Err(PaginationError::InvalidCursor));

        let wrong_shape = Cursor::encode(&IdKey(5)).unwrap();
        assert_eq!(
            wrong_shape.decode::<UserPostKey>(),
            Err(PaginationError::InvalidCursor)
        );
    }

    #[test]
    fn unencodable_keys_are_reported() {
        let mut key = std::collections::BTreeMap::new();
        key.insert(vec![1u8, 2], 7);
        assert!(matches!(Cursor::encode(&key), Err(PaginationError::Encode(_))));
    }

    #[test]
    fn compound_key_uses_camel_case_fields() {
        let key = UserPostKey { user_id: "u1".into(), post_id: 4 };
        let token = Cursor::encode(&key).unwrap();
        let raw = URL_SAFE_NO_PAD.decode(token.as_str()).unwrap();
        assert_eq!(raw, br#"{"userId":"u1","postId":4}"#);
    }

    #[test]
    fn offset_pagination_metadata() {
        let meta = OffsetPagination::new(45, 2, 20);
        assert_eq!(meta.total_pages, 3);
        assert!(meta.has_next);
        assert!(meta.has_previous);

        let last = OffsetPagination::new(45, 3, 20);
        assert!(!last.has_next);

        let none = OffsetPagination::new(0, 1, 20);
        assert_eq!(none.total_pages, 0);
        assert!(!none.has_next);
        assert!(!none.has_previous);

        assert_eq!(OffsetPagination::offset(1, 20), 0);
        assert_eq!(OffsetPagination::offset(3, 20), 40);
    }
}
