//! Worker report endpoint
//!
//! POST /components/:component_id/report lets out-of-process workers report
//! through the status updater.

use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::models::TaskStatus;
use crate::services::{ComponentReport, ReportOutcome};
use crate::AppState;

/// POST /components/:component_id/report request
#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    pub status: TaskStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// POST /components/:component_id/report
pub async fn report_component(
    State(state): State<AppState>,
    Path(component_id): Path<i64>,
    Json(request): Json<ReportRequest>,
) -> ApiResult<Json<ReportOutcome>> {
    let report = ComponentReport {
        status: request.status,
        message: request.message,
        result: request.result,
        error: request.error,
    };

    match state.service.report_component(component_id, report).await? {
        ReportOutcome::NotFound => Err(ApiError::NotFound(format!("Component {}", component_id))),
        outcome => Ok(Json(outcome)),
    }
}

/// Build worker report routes
pub fn component_routes() -> Router<AppState> {
    Router::new().route("/components/:component_id/report", post(report_component))
}
