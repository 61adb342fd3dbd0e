use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};

use klasmwen_types::api::{CursorQuery, LikeToggleResponse};
use klasmwen_types::permissions::{Action, Identity, Resource};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::posts::visible_post;
use crate::validation::{ApiPath, ApiQuery, page_options};
use crate::{authorize, require_member, run_db};

// -- Likes --

pub async fn toggle_like(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(post_id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    require_member(&identity)?;
    visible_post(&state, &identity, post_id).await?;

    let user_id = identity.id.clone();
    let (liked, like_count) = run_db(&state, move |db| db.toggle_like(&user_id, post_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Post"))?;
    Ok(Json(LikeToggleResponse { liked, like_count }))
}

/// Posts a user liked, most recent like first.
pub async fn list_liked_posts(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(user_id): ApiPath<String>,
    ApiQuery(query): ApiQuery<CursorQuery>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&identity, Resource::Posts, Action::Read, None)?;
    let options = page_options(query)?;
    let include_hidden = identity.is_moderator();

    let page = run_db(&state, move |db| {
        if db.get_user_by_id(&user_id)?.is_none() {
            return Err(ApiError::not_found("User").into());
        }
        db.list_liked_posts(&user_id, include_hidden, &options)
    })
    .await?;
    Ok(Json(page))
}

// -- Bookmarks --

pub async fn add_bookmark(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(post_id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    require_member(&identity)?;
    visible_post(&state, &identity, post_id).await?;

    // A second bookmark hits the primary key and is classified as 409
    let user_id = identity.id.clone();
    if !run_db(&state, move |db| db.add_bookmark(&user_id, post_id)).await? {
        return Err(ApiError::not_found("Post"));
    }
    Ok(StatusCode::CREATED)
}

pub async fn remove_bookmark(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(post_id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    require_member(&identity)?;
    let user_id = identity.id.clone();
    if !run_db(&state, move |db| db.remove_bookmark(&user_id, post_id)).await? {
        return Err(ApiError::not_found("Bookmark"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_bookmarks(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiQuery(query): ApiQuery<CursorQuery>,
) -> Result<impl IntoResponse, ApiError> {
    require_member(&identity)?;
    let options = page_options(query)?;
    let include_hidden = identity.is_moderator();

    let page = run_db(&state, move |db| {
        db.list_bookmarks(&identity.id, include_hidden, &options)
    })
    .await?;
    Ok(Json(page))
}
