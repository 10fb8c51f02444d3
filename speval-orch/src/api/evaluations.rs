//! Evaluation API handlers
//!
//! POST /evaluations, GET /evaluations/:task_id/status

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use super::{parse_task_id, OwnerId};
use crate::error::ApiResult;
use crate::models::{SubmissionMetadata, TaskStatus};
use crate::services::StatusSnapshot;
use crate::AppState;

/// POST /evaluations response
#[derive(Debug, Serialize)]
pub struct CreateEvaluationResponse {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub status_message: Option<String>,
}

/// POST /evaluations
///
/// Create an evaluation and dispatch wave 1. Returns 202 Accepted with the task id.
pub async fn create_evaluation(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Json(request): Json<SubmissionMetadata>,
) -> ApiResult<(StatusCode, Json<CreateEvaluationResponse>)> {
    let task = match state.service.create_evaluation(owner_id, request).await {
        Ok(task) => task,
        Err(e) => {
            *state.last_error.write().await = Some(e.to_string());
            return Err(e.into());
        }
    };

    tracing::info!(task_id = %task.task_id, owner_id, "Evaluation accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateEvaluationResponse {
            task_id: task.task_id,
            status: task.status,
            status_message: task.status_message,
        }),
    ))
}

/// GET /evaluations/:task_id/status
///
/// Runs one aggregator tick, then returns the parent and every component.
pub async fn get_status(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(task_id): Path<String>,
) -> ApiResult<Json<StatusSnapshot>> {
    let task_id = parse_task_id(&task_id)?;
    let snapshot = state.service.get_status(task_id, owner_id).await?;
    Ok(Json(snapshot))
}

/// Build evaluation routes
pub fn evaluation_routes() -> Router<AppState> {
    Router::new()
        .route("/evaluations", post(create_evaluation))
        .route("/evaluations/:task_id/status", get(get_status))
        .route("/evaluations/:task_id/events", get(super::sse::evaluation_event_stream))
}
