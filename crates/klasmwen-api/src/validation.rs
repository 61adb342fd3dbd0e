use axum::extract::{FromRequest, FromRequestParts};
use validator::Validate;

use klasmwen_types::api::{CursorQuery, ReportQuery};
use klasmwen_types::pagination::{Cursor, DEFAULT_PAGE_LIMIT, PageOptions};

use crate::error::ApiError;

/// `Json` whose rejections become itemized 400 responses.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// `Query` whose rejections become itemized 400 responses.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// Cursor page options from a query string; `limit` defaults to 20.
pub fn page_options(query: CursorQuery) -> Result<PageOptions, ApiError> {
    query.validate()?;
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    Ok(PageOptions::new(limit, query.cursor.map(Cursor::from)))
}

/// Offset page and limit for the moderation queue.
pub fn offset_params(query: &ReportQuery) -> Result<(u32, u32), ApiError> {
    query.validate()?;
    Ok((query.page.unwrap_or(1), query.limit.unwrap_or(DEFAULT_PAGE_LIMIT)))
}
