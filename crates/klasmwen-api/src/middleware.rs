use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::{Authorization, HeaderMapExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::debug;

use klasmwen_types::api::Claims;
use klasmwen_types::permissions::Identity;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::run_db;

/// Extract and validate JWT from Authorization header, then resolve the
/// caller's current role.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&req)
        .ok_or_else(|| ApiError::Unauthorized("Authentication required".into()))?;
    let identity = decode_identity(&state, &token).await?;
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Like [`require_auth`], but requests without a token proceed as a guest.
/// A token that is present but invalid is still rejected.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = match bearer_token(&req) {
        Some(token) => decode_identity(&state, &token).await?,
        None => Identity::guest(),
    };
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

fn bearer_token(req: &Request) -> Option<String> {
    req.headers()
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
}

/// The token proves who the caller is; the role comes from the users table so
/// role changes apply to tokens already issued.
async fn decode_identity(state: &AppState, token: &str) -> Result<Identity, ApiError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        debug!("Rejected token: {}", e);
        ApiError::from(anyhow::Error::from(e))
    })?;

    let user_id = token_data.claims.sub.to_string();
    let user = run_db(state, move |db| db.get_user_by_id(&user_id))
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Account no longer exists".into()))?;
    Ok(Identity::new(user.id, user.role))
}
