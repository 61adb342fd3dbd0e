//! Comment threads. Replies are flattened to one level: answering a reply
//! files the new comment under the same root and mentions the author being
//! answered.

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;
use validator::Validate;

use klasmwen_db::models::NewComment;
use klasmwen_types::api::{CreateCommentRequest, CursorQuery};
use klasmwen_types::models::Comment;
use klasmwen_types::permissions::{Action, Identity, Resource};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::posts::visible_post;
use crate::validation::{ApiJson, ApiPath, ApiQuery, page_options};
use crate::{authorize, run_db, sees_hidden};

/// Loads a comment the caller may see. A reply is concealed along with its
/// hidden root.
pub(crate) async fn visible_comment(
    state: &AppState,
    identity: &Identity,
    comment_id: i64,
) -> Result<Comment, ApiError> {
    let (comment, root) = run_db(state, move |db| {
        let Some(comment) = db.get_comment(comment_id)? else {
            return Ok(None);
        };
        let root = match comment.parent_id {
            Some(root_id) => db.get_comment(root_id)?,
            None => None,
        };
        Ok(Some((comment, root)))
    })
    .await?
    .ok_or_else(|| ApiError::not_found("Comment"))?;

    let concealed = |c: &Comment| c.hidden && !sees_hidden(identity, &c.author.id);
    if concealed(&comment) || root.as_ref().is_some_and(concealed) {
        return Err(ApiError::not_found("Comment"));
    }
    Ok(comment)
}

/// Root comments of a post, newest first, with the post's total comment
/// count in `totalItems`.
pub async fn list_comments(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(post_id): ApiPath<i64>,
    ApiQuery(query): ApiQuery<CursorQuery>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&identity, Resource::Comments, Action::Read, None)?;
    let options = page_options(query)?;
    visible_post(&state, &identity, post_id).await?;

    let include_hidden = identity.is_moderator();
    let page = run_db(&state, move |db| {
        db.list_root_comments(post_id, include_hidden, &options)
    })
    .await?;
    Ok(Json(page))
}

pub async fn list_replies(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(comment_id): ApiPath<i64>,
    ApiQuery(query): ApiQuery<CursorQuery>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&identity, Resource::Comments, Action::Read, None)?;
    let options = page_options(query)?;
    visible_comment(&state, &identity, comment_id).await?;

    let include_hidden = identity.is_moderator();
    let page = run_db(&state, move |db| {
        db.list_replies(comment_id, include_hidden, &options)
    })
    .await?;
    Ok(Json(page))
}

pub async fn create_comment(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(post_id): ApiPath<i64>,
    ApiJson(req): ApiJson<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&identity, Resource::Comments, Action::Create, None)?;
    req.validate()?;

    let post = visible_post(&state, &identity, post_id).await?;
    let content = req.content.trim();

    let (new, recipient) = match req.parent_id {
        None => (
            NewComment::root(post.id, &identity.id, content),
            post.author.id.clone(),
        ),
        Some(parent_id) => {
            let parent = match visible_comment(&state, &identity, parent_id).await {
                Ok(parent) if parent.post_id == post.id => parent,
                Ok(_) | Err(ApiError::NotFound(_)) => {
                    return Err(ApiError::not_found("Parent comment"));
                }
                Err(e) => return Err(e),
            };
            (
                NewComment::reply_to(&parent, &identity.id, content),
                parent.author.id,
            )
        }
    };

    let comment = run_db(&state, move |db| db.create_comment(&new, Some(&recipient))).await?;
    info!("{} commented {} on post {}", identity.id, comment.id, post.id);

    Ok((StatusCode::CREATED, Json(comment)))
}

/// Deleting a root comment removes its replies too.
pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(comment_id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let comment = visible_comment(&state, &identity, comment_id).await?;
    authorize(&identity, Resource::Comments, Action::Delete, Some(&comment))?;

    if !run_db(&state, move |db| db.delete_comment(comment_id)).await? {
        return Err(ApiError::not_found("Comment"));
    }
    info!("{} deleted comment {}", identity.id, comment_id);
    Ok(StatusCode::NO_CONTENT)
}
