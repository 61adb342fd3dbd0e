use axum::{Extension, Json, extract::State, response::IntoResponse};
use tracing::info;
use validator::Validate;

use klasmwen_types::api::{UpdateProfileRequest, UpdateRoleRequest};
use klasmwen_types::permissions::{Action, Identity, Resource};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::validation::{ApiJson, ApiPath};
use crate::{authorize, run_db};

pub async fn me(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let user = run_db(&state, move |db| db.get_user(&identity.id))
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    Ok(Json(user))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let user = run_db(&state, move |db| {
        db.update_profile(&identity.id, req.bio.as_deref(), req.avatar_url.as_deref())
    })
    .await?
    .ok_or_else(|| ApiError::not_found("User"))?;
    Ok(Json(user))
}

pub async fn get_user(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = run_db(&state, move |db| db.get_user(&user_id))
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    Ok(Json(user))
}

/// Admin only. Takes effect on the user's next request.
pub async fn update_role(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(user_id): ApiPath<String>,
    ApiJson(req): ApiJson<UpdateRoleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&identity, Resource::Users, Action::Update, None)?;

    let role = req.role;
    let user = run_db(&state, move |db| db.set_user_role(&user_id, role))
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    info!("{} changed role of {} to {}", identity.id, user.username, role);
    Ok(Json(user))
}
