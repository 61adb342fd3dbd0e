use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};

use klasmwen_types::api::{CursorQuery, MarkReadResponse, UnreadCountResponse};
use klasmwen_types::permissions::Identity;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::run_db;
use crate::validation::{ApiPath, ApiQuery, page_options};

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiQuery(query): ApiQuery<CursorQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let options = page_options(query)?;
    let page = run_db(&state, move |db| db.list_notifications(&identity.id, &options)).await?;
    Ok(Json(page))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let count = run_db(&state, move |db| db.unread_notification_count(&identity.id)).await?;
    Ok(Json(UnreadCountResponse { count }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(notification_id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let marked = run_db(&state, move |db| {
        db.mark_notification_read(notification_id, &identity.id)
    })
    .await?;
    if !marked {
        return Err(ApiError::not_found("Notification"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = run_db(&state, move |db| db.mark_all_notifications_read(&identity.id)).await?;
    Ok(Json(MarkReadResponse { updated }))
}
