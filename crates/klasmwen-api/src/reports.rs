//! Report filing and the moderation queue.

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;
use validator::Validate;

use klasmwen_types::api::{CreateReportRequest, ReportQuery, UpdateReportRequest, VisibilityRequest};
use klasmwen_types::models::ContentType;
use klasmwen_types::permissions::{Action, Identity, Resource};

use crate::auth::AppState;
use crate::comments::visible_comment;
use crate::error::{ApiError, FieldError};
use crate::posts::visible_post;
use crate::validation::{ApiJson, ApiPath, ApiQuery, offset_params};
use crate::{authorize, run_db};

/// Exactly one of `postId` / `commentId` must be given.
fn report_target(req: &CreateReportRequest) -> Result<(ContentType, i64), ApiError> {
    match (req.post_id, req.comment_id) {
        (Some(post_id), None) => Ok((ContentType::Post, post_id)),
        (None, Some(comment_id)) => Ok((ContentType::Comment, comment_id)),
        _ => Err(ApiError::Validation(vec![FieldError::new(
            "postId",
            "Provide exactly one of postId or commentId",
        )])),
    }
}

fn resource_of(content_type: ContentType) -> Resource {
    match content_type {
        ContentType::Post => Resource::Posts,
        ContentType::Comment => Resource::Comments,
    }
}

pub async fn list_reasons(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let reasons = run_db(&state, |db| db.list_report_reasons()).await?;
    Ok(Json(reasons))
}

pub async fn create_report(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiJson(req): ApiJson<CreateReportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (target, target_id) = report_target(&req)?;
    authorize(&identity, resource_of(target), Action::Report, None)?;
    // Hidden content is reportable only by those who can see it.
    match target {
        ContentType::Post => {
            visible_post(&state, &identity, target_id).await?;
        }
        ContentType::Comment => {
            visible_comment(&state, &identity, target_id).await?;
        }
    }

    let reason_id = req.reason_id;
    let reporter_id = identity.id.clone();
    let report = run_db(&state, move |db| {
        if db.get_report_reason(reason_id)?.is_none() {
            return Err(ApiError::not_found("Report reason").into());
        }
        db.create_report(&reporter_id, reason_id, target, target_id)
    })
    .await?
    .ok_or_else(|| match target {
        ContentType::Post => ApiError::not_found("Post"),
        ContentType::Comment => ApiError::not_found("Comment"),
    })?;

    info!(
        "{} reported {} {} (report {})",
        identity.id,
        target.as_str(),
        target_id,
        report.id
    );
    Ok((StatusCode::CREATED, Json(report)))
}

/// Moderation queue: newest first, offset paginated, filterable.
pub async fn list_reports(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiQuery(query): ApiQuery<ReportQuery>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&identity, Resource::Reports, Action::Read, None)?;
    let (page, limit) = offset_params(&query)?;
    let filters = query.filters();

    let reports = run_db(&state, move |db| db.list_reports(&filters, page, limit)).await?;
    Ok(Json(reports))
}

pub async fn update_report(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(report_id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateReportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&identity, Resource::Reports, Action::Update, None)?;
    req.validate()?;

    let status = req.status;
    let report = run_db(&state, move |db| {
        db.update_report_status(report_id, status, req.moderator_notes.as_deref())
    })
    .await?
    .ok_or_else(|| ApiError::not_found("Report"))?;

    info!("{} set report {} to {}", identity.id, report_id, status.as_str());
    Ok(Json(report))
}

pub async fn delete_report(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(report_id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&identity, Resource::Reports, Action::Delete, None)?;
    if !run_db(&state, move |db| db.delete_report(report_id)).await? {
        return Err(ApiError::not_found("Report"));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Hides or restores a post or comment. Every report on that content
/// reflects the change through `isContentHidden`.
pub async fn toggle_visibility(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiJson(req): ApiJson<VisibilityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&identity, Resource::Reports, Action::Update, None)?;

    let (resource_type, resource_id, hidden) = (req.resource_type, req.resource_id, req.hidden);
    let changed = run_db(&state, move |db| {
        db.set_content_hidden(resource_type, resource_id, hidden)
    })
    .await?;
    if !changed {
        return Err(match resource_type {
            ContentType::Post => ApiError::not_found("Post"),
            ContentType::Comment => ApiError::not_found("Comment"),
        });
    }

    info!(
        "{} set {} {} hidden={}",
        identity.id,
        resource_type.as_str(),
        resource_id,
        hidden
    );
    Ok(Json(req))
}
