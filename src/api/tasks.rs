use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{client_ip, ApiToken};
use crate::core::state::AppState;
use crate::db::models::{Group, GroupRating};
use crate::db::types::TaskKey;
use crate::schemas::task::{
    ChecksQuery, SubmissionCheckResponse, SubmitTaskRequest, TaskStatusResponse,
};
use crate::store::{retry_on_conflict, NewSubmission};

const MAX_CHECKS_PAGE: i64 = 200;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/group/:group_id/variant/:variant_id/task/:task_id", get(get_task).post(submit_task))
        .route("/group/:group_id/variant/:variant_id/task/:task_id/checks", get(list_checks))
        .route("/group/:group_id/statuses", get(group_statuses))
        .route("/rating/groups", get(group_rating))
}

async fn require_group(state: &AppState, group_id: i32) -> Result<Group, ApiError> {
    state.store().group(group_id).await?.ok_or_else(|| ApiError::NotFound("Group not found".into()))
}

async fn get_task(
    State(state): State<AppState>,
    Path((group_id, variant_id, task_id)): Path<(i32, i32, i32)>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    let key = TaskKey::new(task_id, variant_id, group_id);
    let row = state.store().task_status(key).await?;
    Ok(Json(TaskStatusResponse::from_row(key, row)))
}

async fn submit_task(
    State(state): State<AppState>,
    Path((group_id, variant_id, task_id)): Path<(i32, i32, i32)>,
    _token: ApiToken,
    headers: HeaderMap,
    Json(payload): Json<SubmitTaskRequest>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    if state.settings().api().readonly {
        return Err(ApiError::Forbidden("Submissions are disallowed"));
    }
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let group = require_group(&state, group_id).await?;
    let paused = state.store().final_seed(group.id).await?.is_some_and(|seed| !seed.active);
    if paused {
        return Err(ApiError::Forbidden("Submissions are disallowed"));
    }

    let key = TaskKey::new(task_id, variant_id, group.id);
    let ip = client_ip(&headers);
    let submission = NewSubmission {
        key,
        code: &payload.code,
        ip: &ip,
        student_id: payload.student_id,
        session_id: payload.session_id.as_deref(),
    };

    let store = state.store();
    let outcome = retry_on_conflict(move || store.submit_task(submission)).await?;

    metrics::counter!("submissions_total").increment(1);
    tracing::info!(
        message_id = outcome.message.id,
        %key,
        status = %outcome.status.status,
        ip = %ip,
        "Submission accepted"
    );

    Ok(Json(TaskStatusResponse::from_row(key, Some(outcome.status))))
}

async fn list_checks(
    State(state): State<AppState>,
    Path((group_id, variant_id, task_id)): Path<(i32, i32, i32)>,
    Query(params): Query<ChecksQuery>,
) -> Result<Json<Vec<SubmissionCheckResponse>>, ApiError> {
    if params.skip < 0 || params.take < 1 {
        return Err(ApiError::BadRequest("skip must be >= 0 and take must be >= 1".to_string()));
    }

    let key = TaskKey::new(task_id, variant_id, group_id);
    let checks =
        state.store().checks_for_task(key, params.skip, params.take.min(MAX_CHECKS_PAGE)).await?;

    Ok(Json(checks.into_iter().map(SubmissionCheckResponse::from).collect()))
}

async fn group_statuses(
    State(state): State<AppState>,
    Path(group_id): Path<i32>,
) -> Result<Json<Vec<TaskStatusResponse>>, ApiError> {
    let group = require_group(&state, group_id).await?;
    let rows = state.store().statuses_by_group(group.id).await?;

    Ok(Json(
        rows.into_iter().map(|row| TaskStatusResponse::from_row(row.key(), Some(row))).collect(),
    ))
}

async fn group_rating(State(state): State<AppState>) -> Result<Json<Vec<GroupRating>>, ApiError> {
    Ok(Json(state.store().group_rating().await?))
}
