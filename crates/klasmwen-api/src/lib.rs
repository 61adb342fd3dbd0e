pub mod auth;
pub mod comments;
pub mod engagement;
pub mod error;
pub mod middleware;
pub mod notifications;
pub mod posts;
pub mod reports;
pub mod users;
pub mod validation;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, patch, post},
};
use tracing::{error, warn};

use klasmwen_db::Database;
use klasmwen_types::models::Role;
use klasmwen_types::permissions::{Action, Identity, Owned, Resource, has_permission};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::{optional_auth, require_auth};

/// Full API router. Read-only content routes accept anonymous callers (as
/// GUEST); everything else needs a bearer token.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let read_routes = Router::new()
        .route("/posts", get(posts::list_posts))
        .route("/posts/{id}", get(posts::get_post))
        .route("/posts/{id}/comments", get(comments::list_comments))
        .route("/comments/{id}/replies", get(comments::list_replies))
        .route("/users/{id}", get(users::get_user))
        .route("/users/{id}/posts", get(posts::list_user_posts))
        .route("/users/{id}/likes", get(engagement::list_liked_posts))
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), optional_auth));

    let protected_routes = Router::new()
        .route("/users/me", get(users::me).patch(users::update_me))
        .route("/users/{id}/role", patch(users::update_role))
        .route("/posts", post(posts::create_post))
        .route("/posts/{id}", patch(posts::update_post).delete(posts::delete_post))
        .route("/posts/{id}/like", post(engagement::toggle_like))
        .route(
            "/posts/{id}/bookmark",
            post(engagement::add_bookmark).delete(engagement::remove_bookmark),
        )
        .route("/bookmarks", get(engagement::list_bookmarks))
        .route("/posts/{id}/comments", post(comments::create_comment))
        .route("/comments/{id}", axum::routing::delete(comments::delete_comment))
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/notifications/{id}/read", post(notifications::mark_read))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route("/reports/reasons", get(reports::list_reasons))
        .route("/reports", get(reports::list_reports).post(reports::create_report))
        .route("/reports/{id}", patch(reports::update_report).delete(reports::delete_report))
        .route("/moderation/visibility", post(reports::toggle_visibility))
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(read_routes)
        .merge(protected_routes)
        .fallback(unknown_route)
        .method_not_allowed_fallback(method_not_allowed)
        .with_state(state)
}

async fn unknown_route() -> ApiError {
    ApiError::not_found("Route")
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

/// Runs blocking database work off the async runtime.
pub(crate) async fn run_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })?
        .map_err(ApiError::from)
}

/// Policy check for the caller; denial is a 403.
pub(crate) fn authorize(
    identity: &Identity,
    resource: Resource,
    action: Action,
    data: Option<&dyn Owned>,
) -> Result<(), ApiError> {
    if has_permission(identity, resource, action, data) {
        Ok(())
    } else {
        warn!(
            "Denied {:?} on {:?} for {} ({})",
            action,
            resource,
            identity.id,
            identity.role.as_str()
        );
        Err(ApiError::forbidden())
    }
}

/// Likes and bookmarks need a real account.
pub(crate) fn require_member(identity: &Identity) -> Result<(), ApiError> {
    if identity.role == Role::Guest || identity.id.is_empty() {
        return Err(ApiError::forbidden());
    }
    Ok(())
}

/// Hidden content stays visible to moderators and its own author.
pub(crate) fn sees_hidden(viewer: &Identity, owner_id: &str) -> bool {
    viewer.is_moderator() || (!viewer.id.is_empty() && viewer.id == owner_id)
}
