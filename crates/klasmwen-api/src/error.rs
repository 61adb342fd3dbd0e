//! Error classification.
//!
//! Handlers and database calls fail with `anyhow::Error`; [`classify`] turns
//! any such error into an [`ApiError`] with a stable status and a client-safe
//! message. Internal details are logged, never echoed.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use rusqlite::ErrorCode;
use rusqlite::ffi;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};
use validator::{ValidationErrors, ValidationErrorsKind};

use klasmwen_types::pagination::PaginationError;

/// One invalid input field, addressed by its JSON name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation failed")]
    Validation(Vec<FieldError>),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Request timed out")]
    RequestTimeout,
    #[error("Service temporarily unavailable")]
    ServiceUnavailable,
    #[error("Internal server error")]
    Internal,
}

/// JSON body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

impl ApiError {
    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{} not found", what))
    }

    pub fn forbidden() -> Self {
        Self::Forbidden("You do not have permission to perform this action".into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> ErrorBody {
        let errors = match self {
            Self::Validation(errors) => Some(errors.clone()),
            _ => None,
        };
        ErrorBody {
            message: self.to_string(),
            errors,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        classify(err)
    }
}

impl From<PaginationError> for ApiError {
    fn from(err: PaginationError) -> Self {
        classify_pagination(&err)
    }
}

/// One entry per failing rule, ordered by path. Struct-level rules are
/// reported against `body`.
impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields = Vec::new();
        for (field, kind) in errors.errors() {
            let ValidationErrorsKind::Field(failures) = kind else {
                continue;
            };
            let path = json_path(field);
            for failure in failures {
                let message = match &failure.message {
                    Some(message) => message.to_string(),
                    None if failure.code == "blank" => format!("{} is required", path),
                    None => format!("{} is invalid", path),
                };
                fields.push(FieldError::new(path.clone(), message));
            }
        }
        fields.sort_by(|a, b| a.path.cmp(&b.path));
        Self::Validation(fields)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let detail = rejection.body_text();
        warn!("Rejected JSON body: {}", detail);
        let field = serde_field(&detail).unwrap_or("body");
        Self::Validation(vec![FieldError::new(field, detail.clone())])
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        let detail = rejection.body_text();
        warn!("Rejected query string: {}", detail);
        let field = serde_field(&detail).unwrap_or("query");
        Self::Validation(vec![FieldError::new(field, detail.clone())])
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(vec![FieldError::new("id", rejection.body_text())])
    }
}

/// Maps any error to its API form. Total: unknown errors become
/// [`ApiError::Internal`] after being logged.
pub fn classify(err: anyhow::Error) -> ApiError {
    let err = match err.downcast::<ApiError>() {
        Ok(api) => return api,
        Err(err) => err,
    };

    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<PaginationError>() {
            return classify_pagination(e);
        }
        if let Some(e) = cause.downcast_ref::<rusqlite::Error>() {
            return classify_sqlite(e);
        }
        if let Some(e) = cause.downcast_ref::<jsonwebtoken::errors::Error>() {
            return classify_jwt(e);
        }
        if let Some(e) = cause.downcast_ref::<std::io::Error>() {
            match e.kind() {
                std::io::ErrorKind::ConnectionRefused => return ApiError::ServiceUnavailable,
                std::io::ErrorKind::TimedOut => return ApiError::RequestTimeout,
                _ => {}
            }
        }
    }

    let message = format!("{:#}", err).to_lowercase();
    if message.contains("connection refused") {
        return ApiError::ServiceUnavailable;
    }
    if message.contains("timed out") || message.contains("timeout") {
        return ApiError::RequestTimeout;
    }

    error!("Unhandled error: {:#}", err);
    ApiError::Internal
}

fn classify_pagination(err: &PaginationError) -> ApiError {
    let message = match err {
        PaginationError::InvalidCursor => "Invalid cursor",
        PaginationError::UnknownCursor => "Cursor does not match any record",
        PaginationError::MixedDirections => "Invalid sort order",
        PaginationError::Encode(detail) => {
            error!("Cursor encoding failed: {}", detail);
            return ApiError::Internal;
        }
    };
    ApiError::BadRequest(message.into())
}

/// JSON name of a validated Rust field: `avatar_url` becomes `avatarUrl`.
fn json_path(field: &str) -> String {
    if field == "__all__" {
        return "body".into();
    }
    let mut path = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            path.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            path.push(c);
        }
    }
    path
}

fn classify_sqlite(err: &rusqlite::Error) -> ApiError {
    match err {
        rusqlite::Error::QueryReturnedNoRows => ApiError::not_found("Resource"),
        rusqlite::Error::SqliteFailure(failure, detail) => match failure.extended_code {
            ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                ApiError::Conflict(conflict_message(detail.as_deref()))
            }
            ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                ApiError::BadRequest("Referenced record does not exist".into())
            }
            ffi::SQLITE_CONSTRAINT_NOTNULL | ffi::SQLITE_CONSTRAINT_CHECK => {
                ApiError::BadRequest("Invalid data: a required field is missing or out of range".into())
            }
            _ => match failure.code {
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::NotADatabase => {
                    warn!("Database unavailable: {}", err);
                    ApiError::ServiceUnavailable
                }
                _ => {
                    error!("Database error: {}", err);
                    ApiError::Internal
                }
            },
        },
        other => {
            error!("Database error: {}", other);
            ApiError::Internal
        }
    }
}

/// Builds the 409 message from SQLite's "UNIQUE constraint failed: t.c" text.
fn conflict_message(detail: Option<&str>) -> String {
    let target = detail
        .and_then(|d| d.split_once(": "))
        .and_then(|(_, columns)| columns.split(", ").next())
        .and_then(|column| column.split_once('.'));

    match target {
        Some(("users", "username")) => "User with this username already exists.".into(),
        Some(("likes", _)) => "You have already liked this post.".into(),
        Some(("bookmarks", _)) => "Post already bookmarked.".into(),
        Some((table, column)) => format!("A {} record with this {} already exists.", table, column),
        None => "Resource already exists.".into(),
    }
}

fn classify_jwt(err: &jsonwebtoken::errors::Error) -> ApiError {
    match err.kind() {
        JwtErrorKind::ExpiredSignature => ApiError::Unauthorized("Token expired".into()),
        _ => ApiError::Unauthorized("Invalid token".into()),
    }
}

/// Field named in a serde message such as "missing field `title`".
fn serde_field(detail: &str) -> Option<&str> {
    let start = detail.find("field `")? + "field `".len();
    let rest = &detail[start..];
    let end = rest.find('`')?;
    Some(&rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use klasmwen_db::Database;

    fn unique_username_error() -> anyhow::Error {
        let db = Database::open_in_memory().unwrap();
        db.create_user("a", "alice", "h").unwrap();
        db.create_user("b", "alice", "h").unwrap_err()
    }

    #[test]
    fn duplicate_username_is_conflict_with_message() {
        let api = classify(unique_username_error());
        assert_eq!(api.status(), StatusCode::CONFLICT);
        assert_eq!(api.body().message, "User with this username already exists.");
    }

    #[test]
    fn duplicate_bookmark_is_conflict() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("a", "alice", "h").unwrap();
        let post = db.create_post("a", "t", "c").unwrap();
        db.add_bookmark("a", post.id).unwrap();
        let api = classify(db.add_bookmark("a", post.id).unwrap_err());
        assert_eq!(api.status(), StatusCode::CONFLICT);
        assert_eq!(api.body().message, "Post already bookmarked.");
    }

    #[test]
    fn context_does_not_hide_the_cause() {
        let err = unique_username_error().context("registering user");
        assert_eq!(classify(err).status(), StatusCode::CONFLICT);
    }

    #[test]
    fn missing_row_is_not_found() {
        let err = anyhow::Error::from(rusqlite::Error::QueryReturnedNoRows);
        assert_eq!(classify(err).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn busy_database_is_unavailable() {
        let failure = rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_BUSY),
            Some("database is locked".into()),
        );
        assert_eq!(classify(failure.into()).status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn api_errors_pass_through() {
        let err = anyhow::Error::new(ApiError::not_found("Post"));
        let api = classify(err);
        assert_eq!(api.status(), StatusCode::NOT_FOUND);
        assert_eq!(api.body().message, "Post not found");
    }

    #[test]
    fn pagination_errors_are_bad_requests() {
        let err = anyhow::Error::new(PaginationError::UnknownCursor);
        assert_eq!(classify(err).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn jwt_errors_are_unauthorized() {
        let expired = jsonwebtoken::errors::Error::from(JwtErrorKind::ExpiredSignature);
        let api = classify(expired.into());
        assert_eq!(api.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(api.body().message, "Token expired");

        let invalid = jsonwebtoken::errors::Error::from(JwtErrorKind::InvalidSignature);
        assert_eq!(classify(invalid.into()).body().message, "Invalid token");
    }

    #[test]
    fn io_and_message_fallbacks() {
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "nope");
        assert_eq!(classify(refused.into()).status(), StatusCode::SERVICE_UNAVAILABLE);

        let timed_out = anyhow::anyhow!("upstream request timed out");
        assert_eq!(classify(timed_out).status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[test]
    fn unknown_errors_are_internal_and_opaque() {
        let api = classify(anyhow::anyhow!("secret path /var/db exploded"));
        assert_eq!(api.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::to_value(api.body()).unwrap();
        assert_eq!(body, serde_json::json!({ "message": "Internal server error" }));
    }

    #[test]
    fn validation_lists_each_field() {
        let api = ApiError::Validation(vec![
            FieldError::new("title", "Title is required"),
            FieldError::new("content", "Content is required"),
        ]);
        assert_eq!(api.status(), StatusCode::BAD_REQUEST);
        let body = api.body();
        assert_eq!(body.errors.map(|e| e.len()), Some(2));
    }

    #[test]
    fn validator_errors_become_itemized_paths() {
        use klasmwen_types::api::{CreatePostRequest, UpdatePostRequest, UpdateProfileRequest};
        use validator::Validate;

        let req = CreatePostRequest { title: " ".into(), content: String::new() };
        let api = ApiError::from(req.validate().unwrap_err());
        let body = serde_json::to_value(api.body()).unwrap();
        assert_eq!(body["message"], "Validation failed");
        assert_eq!(
            body["errors"],
            serde_json::json!([
                { "path": "content", "message": "content is required" },
                { "path": "title", "message": "title is required" },
            ])
        );

        let req = UpdateProfileRequest { bio: None, avatar_url: Some("ftp://x".into()) };
        match ApiError::from(req.validate().unwrap_err()) {
            ApiError::Validation(errors) => assert_eq!(errors[0].path, "avatarUrl"),
            other => panic!("unexpected {:?}", other),
        }

        let req = UpdatePostRequest { title: None, content: None };
        match ApiError::from(req.validate().unwrap_err()) {
            ApiError::Validation(errors) => assert_eq!(errors[0].path, "body"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn cursor_encoding_failures_are_internal() {
        let err = anyhow::Error::new(PaginationError::Encode("key must be a string".into()));
        assert_eq!(classify(err).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn serde_field_names_are_extracted() {
        assert_eq!(
            serde_field("Failed to deserialize: missing field `title` at line 1"),
            Some("title")
        );
        assert_eq!(serde_field("expected value at line 1 column 1"), None);
    }
}
