use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;
use validator::Validate;

use klasmwen_types::api::{CreatePostRequest, CursorQuery, UpdatePostRequest};
use klasmwen_types::models::Post;
use klasmwen_types::permissions::{Action, Identity, Resource};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::validation::{ApiJson, ApiPath, ApiQuery, page_options};
use crate::{authorize, run_db, sees_hidden};

/// Loads a post the caller is allowed to see. Hidden posts look absent to
/// everyone but moderators and the author.
pub(crate) async fn visible_post(
    state: &AppState,
    identity: &Identity,
    post_id: i64,
) -> Result<Post, ApiError> {
    let post = run_db(state, move |db| db.get_post(post_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Post"))?;
    if post.hidden && !sees_hidden(identity, &post.author.id) {
        return Err(ApiError::not_found("Post"));
    }
    Ok(post)
}

pub async fn list_posts(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiQuery(query): ApiQuery<CursorQuery>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&identity, Resource::Posts, Action::Read, None)?;
    let options = page_options(query)?;
    let include_hidden = identity.is_moderator();

    let page = run_db(&state, move |db| db.list_posts(None, include_hidden, &options)).await?;
    Ok(Json(page))
}

pub async fn list_user_posts(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(user_id): ApiPath<String>,
    ApiQuery(query): ApiQuery<CursorQuery>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&identity, Resource::Posts, Action::Read, None)?;
    let options = page_options(query)?;
    let include_hidden = sees_hidden(&identity, &user_id);

    let page = run_db(&state, move |db| {
        if db.get_user_by_id(&user_id)?.is_none() {
            return Err(ApiError::not_found("User").into());
        }
        db.list_posts(Some(&user_id), include_hidden, &options)
    })
    .await?;
    Ok(Json(page))
}

pub async fn get_post(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(post_id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&identity, Resource::Posts, Action::Read, None)?;
    let post = visible_post(&state, &identity, post_id).await?;
    Ok(Json(post))
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiJson(req): ApiJson<CreatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&identity, Resource::Posts, Action::Create, None)?;
    req.validate()?;

    let author_id = identity.id.clone();
    let post = run_db(&state, move |db| {
        db.create_post(&author_id, req.title.trim(), &req.content)
    })
    .await?;
    info!("{} created post {}", identity.id, post.id);

    Ok((StatusCode::CREATED, Json(post)))
}

/// Owner edits only; admins cannot rewrite other users' posts.
pub async fn update_post(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(post_id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let post = visible_post(&state, &identity, post_id).await?;
    authorize(&identity, Resource::Posts, Action::Update, Some(&post))?;

    let post = run_db(&state, move |db| {
        db.update_post(
            post_id,
            req.title.as_deref().map(str::trim),
            req.content.as_deref(),
        )
    })
    .await?
    .ok_or_else(|| ApiError::not_found("Post"))?;
    Ok(Json(post))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(post_id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let post = visible_post(&state, &identity, post_id).await?;
    authorize(&identity, Resource::Posts, Action::Delete, Some(&post))?;

    if !run_db(&state, move |db| db.delete_post(post_id)).await? {
        return Err(ApiError::not_found("Post"));
    }
    info!("{} deleted post {}", identity.id, post_id);
    Ok(StatusCode::NO_CONTENT)
}
