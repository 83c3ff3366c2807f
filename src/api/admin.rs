use axum::{
    extract::{Path, State},
    routing::{delete, post},
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::ApiToken;
use crate::core::state::AppState;
use crate::schemas::admin::{
    AffectedRowsResponse, CreateGroupsRequest, CreateGroupsResponse, FinalSeedResponse,
};
use crate::store::StoreError;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/groups", post(create_groups))
        .route("/achievements/clear", post(clear_achievements))
        .route("/group/:group_id/statuses", delete(delete_group_statuses))
        .route("/group/:group_id/final-seed", post(begin_final_test).delete(delete_final_seed))
        .route("/group/:group_id/final-seed/continue", post(continue_final_test))
        .route("/group/:group_id/final-seed/end", post(end_final_test))
}

async fn create_groups(
    State(state): State<AppState>,
    _token: ApiToken,
    Json(payload): Json<CreateGroupsRequest>,
) -> Result<Json<CreateGroupsResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let titles: Vec<String> = payload
        .titles
        .iter()
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
        .collect();
    if titles.is_empty() {
        return Err(ApiError::BadRequest("titles must not be blank".to_string()));
    }

    let created = state.store().create_groups(&titles).await?;
    tracing::info!(created = created.len(), requested = titles.len(), "Groups created");
    Ok(Json(CreateGroupsResponse { created }))
}

async fn clear_achievements(
    State(state): State<AppState>,
    _token: ApiToken,
) -> Result<Json<AffectedRowsResponse>, ApiError> {
    let affected = state.store().clear_achievements().await?;
    tracing::info!(affected, "Achievements cleared");
    Ok(Json(AffectedRowsResponse { affected }))
}

async fn delete_group_statuses(
    State(state): State<AppState>,
    Path(group_id): Path<i32>,
    _token: ApiToken,
) -> Result<Json<AffectedRowsResponse>, ApiError> {
    let affected = state.store().delete_group_statuses(group_id).await?;
    tracing::warn!(group_id, affected, "Task statuses deleted");
    Ok(Json(AffectedRowsResponse { affected }))
}

async fn begin_final_test(
    State(state): State<AppState>,
    Path(group_id): Path<i32>,
    _token: ApiToken,
) -> Result<Json<FinalSeedResponse>, ApiError> {
    let seed = state.store().begin_final_test(group_id).await.map_err(|err| match err {
        StoreError::Conflict => {
            ApiError::Conflict("Final test already started for this group".to_string())
        }
        other => other.into(),
    })?;
    tracing::info!(group_id, "Final test started");
    Ok(Json(seed.into()))
}

async fn continue_final_test(
    State(state): State<AppState>,
    Path(group_id): Path<i32>,
    _token: ApiToken,
) -> Result<Json<FinalSeedResponse>, ApiError> {
    let seed = state.store().set_final_test_active(group_id, true).await?;
    tracing::info!(group_id, "Final test resumed");
    Ok(Json(seed.into()))
}

async fn end_final_test(
    State(state): State<AppState>,
    Path(group_id): Path<i32>,
    _token: ApiToken,
) -> Result<Json<FinalSeedResponse>, ApiError> {
    let seed = state.store().set_final_test_active(group_id, false).await?;
    tracing::info!(group_id, "Final test paused");
    Ok(Json(seed.into()))
}

async fn delete_final_seed(
    State(state): State<AppState>,
    Path(group_id): Path<i32>,
    _token: ApiToken,
) -> Result<Json<AffectedRowsResponse>, ApiError> {
    if !state.store().delete_final_seed(group_id).await? {
        return Err(ApiError::NotFound("final seed not found".to_string()));
    }
    tracing::info!(group_id, "Final seed deleted");
    Ok(Json(AffectedRowsResponse { affected: 1 }))
}
