//! speval-orch library interface
//!
//! Exposes the orchestrator's services, storage and HTTP router for the binary
//! and for integration tests.

pub mod api;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult, OrchestratorError, OrchestratorResult};

use axum::Router;
use chrono::{DateTime, Utc};
use speval_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::services::EvaluationService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub event_bus: EventBus,
    pub service: Arc<EvaluationService>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(db: SqlitePool, event_bus: EventBus, service: Arc<EvaluationService>) -> Self {
        Self {
            db,
            event_bus,
            service,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::evaluation_routes())
        .merge(api::component_routes())
        .merge(api::outcome_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
