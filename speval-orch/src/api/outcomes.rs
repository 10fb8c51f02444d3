//! Outcome history handlers
//!
//! GET /outcomes, GET /outcomes/report, GET /outcomes/:outcome_id

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use super::OwnerId;
use crate::error::ApiResult;
use crate::models::OutcomeRecord;
use crate::services::ProgressReport;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct OutcomeListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// GET /outcomes
///
/// Caller's outcome records, newest first.
pub async fn list_outcomes(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Query(query): Query<OutcomeListQuery>,
) -> ApiResult<Json<Vec<OutcomeRecord>>> {
    Ok(Json(state.service.list_outcomes(owner_id, query.limit).await?))
}

/// GET /outcomes/report
///
/// Caller's progress over the last 30 days.
pub async fn progress_report(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
) -> ApiResult<Json<ProgressReport>> {
    Ok(Json(state.service.progress_report(owner_id).await?))
}

/// GET /outcomes/:outcome_id
pub async fn get_outcome(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(outcome_id): Path<i64>,
) -> ApiResult<Json<OutcomeRecord>> {
    Ok(Json(state.service.get_outcome(outcome_id, owner_id).await?))
}

/// Build outcome routes
pub fn outcome_routes() -> Router<AppState> {
    Router::new()
        .route("/outcomes", get(list_outcomes))
        .route("/outcomes/report", get(progress_report))
        .route("/outcomes/:outcome_id", get(get_outcome))
}
