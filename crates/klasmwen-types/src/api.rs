use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::{ContentType, ReportStatus, Role};

// -- JWT Claims --

/// JWT claims issued at login/registration. The auth middleware trusts
/// `sub` and reloads the role from the users table on every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub role: Role,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    #[validate(
        length(min = 3, max = 32, message = "username must be between 3 and 32 characters"),
        custom(function = "username_chars")
    )]
    pub username: String,
    #[validate(length(min = 8, max = 128, message = "password must be between 8 and 128 characters"))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
    pub token: String,
}

// -- Users --

/// An empty string clears the field.
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(length(max = 500, message = "bio must be at most 500 characters"))]
    pub bio: Option<String>,
    #[validate(
        custom(function = "http_url"),
        length(max = 500, message = "avatarUrl must be at most 500 characters")
    )]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

// -- Posts --

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CreatePostRequest {
    #[validate(
        custom(function = "not_blank", message = "title is required"),
        length(max = 200, message = "title must be at most 200 characters")
    )]
    pub title: String,
    #[validate(
        custom(function = "not_blank", message = "content is required"),
        length(max = 20000, message = "content must be at most 20000 characters")
    )]
    pub content: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = "has_post_changes"))]
pub struct UpdatePostRequest {
    #[validate(
        custom(function = "not_blank", message = "title is required"),
        length(max = 200, message = "title must be at most 200 characters")
    )]
    pub title: Option<String>,
    #[validate(
        custom(function = "not_blank", message = "content is required"),
        length(max = 20000, message = "content must be at most 20000 characters")
    )]
    pub content: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeToggleResponse {
    pub liked: bool,
    pub like_count: i64,
}

// -- Comments --

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CreateCommentRequest {
    #[validate(
        custom(function = "not_blank", message = "content is required"),
        length(max = 2000, message = "content must be at most 2000 characters")
    )]
    pub content: String,
    pub parent_id: Option<i64>,
}

// -- Reports --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CreateReportRequest {
    pub reason_id: i64,
    pub post_id: Option<i64>,
    pub comment_id: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct UpdateReportRequest {
    pub status: ReportStatus,
    #[validate(length(max = 1000, message = "moderatorNotes must be at most 1000 characters"))]
    pub moderator_notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityRequest {
    pub resource_type: ContentType,
    pub resource_id: i64,
    pub hidden: bool,
}

/// Moderation queue filters, all optional and combined with AND.
#[derive(Debug, Clone, Default)]
pub struct ReportFilters {
    pub status: Option<ReportStatus>,
    pub reason_id: Option<i64>,
    pub post_id: Option<i64>,
    pub comment_id: Option<i64>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub resource_type: Option<ContentType>,
}

/// Query string of `GET /reports`. Kept flat: urlencoded numbers do not
/// survive `#[serde(flatten)]`.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReportQuery {
    pub status: Option<ReportStatus>,
    pub reason_id: Option<i64>,
    pub post_id: Option<i64>,
    pub comment_id: Option<i64>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub resource_type: Option<ContentType>,
    #[validate(range(min = 1, message = "page must be at least 1"))]
    pub page: Option<u32>,
    #[validate(range(min = 1, max = 100, message = "limit must be between 1 and 100"))]
    pub limit: Option<u32>,
}

impl ReportQuery {
    pub fn filters(&self) -> ReportFilters {
        ReportFilters {
            status: self.status,
            reason_id: self.reason_id,
            post_id: self.post_id,
            comment_id: self.comment_id,
            date_from: self.date_from,
            date_to: self.date_to,
            resource_type: self.resource_type,
        }
    }
}

// -- Pagination --

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CursorQuery {
    #[validate(range(min = 1, max = 60, message = "limit must be between 1 and 60"))]
    pub limit: Option<u32>,
    pub cursor: Option<String>,
}

// -- Notifications --

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadCountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkReadResponse {
    pub updated: usize,
}

// -- Field rules --

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

fn username_chars(value: &str) -> Result<(), ValidationError> {
    if value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(ValidationError::new("username_chars")
            .with_message("username may only contain letters, digits and underscores".into()))
    }
}

/// Absolute http(s) link. Empty is allowed and clears the avatar.
fn http_url(value: &str) -> Result<(), ValidationError> {
    let scheme_ok = value.starts_with("https://") || value.starts_with("http://");
    if value.is_empty() || (scheme_ok && !value.contains(char::is_whitespace)) {
        Ok(())
    } else {
        Err(ValidationError::new("http_url").with_message("avatarUrl must be an http(s) URL".into()))
    }
}

fn has_post_changes(req: &UpdatePostRequest) -> Result<(), ValidationError> {
    if req.title.is_none() && req.content.is_none() {
        return Err(ValidationError::new("empty_update")
            .with_message("Provide a title or content to update".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::{MAX_OFFSET_LIMIT, MAX_PAGE_LIMIT};

    fn failing_fields(result: Result<(), validator::ValidationErrors>) -> Vec<String> {
        let mut fields: Vec<String> = match result {
            Ok(()) => Vec::new(),
            Err(errors) => errors.errors().keys().map(|k| k.to_string()).collect(),
        };
        fields.sort();
        fields
    }

    #[test]
    fn blank_title_and_content_both_fail() {
        let req = CreatePostRequest { title: "   ".into(), content: String::new() };
        assert_eq!(failing_fields(req.validate()), vec!["content", "title"]);

        let req = CreatePostRequest { title: "t".repeat(201), content: "ok".into() };
        assert_eq!(failing_fields(req.validate()), vec!["title"]);
    }

    #[test]
    fn usernames_are_restricted() {
        for (name, ok) in [("alice_01", true), ("al", false), ("bad name", false)] {
            let req = RegisterRequest { username: name.into(), password: "long-enough".into() };
            assert_eq!(req.validate().is_ok(), ok, "{}", name);
        }
    }

    #[test]
    fn avatar_must_be_http() {
        let bad = UpdateProfileRequest { bio: None, avatar_url: Some("javascript:alert(1)".into()) };
        assert_eq!(failing_fields(bad.validate()), vec!["avatar_url"]);

        for url in ["https://cdn.example.org/me.png", ""] {
            let ok = UpdateProfileRequest { bio: None, avatar_url: Some(url.into()) };
            assert!(ok.validate().is_ok(), "{}", url);
        }
    }

    #[test]
    fn empty_post_update_is_rejected() {
        let req = UpdatePostRequest { title: None, content: None };
        assert_eq!(failing_fields(req.validate()), vec!["__all__"]);

        let req = UpdatePostRequest { title: Some("new".into()), content: None };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn limits_match_pagination_bounds() {
        let query = |limit| CursorQuery { limit: Some(limit), cursor: None };
        assert!(query(MAX_PAGE_LIMIT).validate().is_ok());
        assert!(query(MAX_PAGE_LIMIT + 1).validate().is_err());
        assert!(query(0).validate().is_err());
        assert!(CursorQuery::default().validate().is_ok());

        let reports = |page, limit| ReportQuery { page: Some(page), limit: Some(limit), ..Default::default() };
        assert!(reports(1, MAX_OFFSET_LIMIT).validate().is_ok());
        assert_eq!(failing_fields(reports(0, MAX_OFFSET_LIMIT + 1).validate()), vec!["limit", "page"]);
    }
}
