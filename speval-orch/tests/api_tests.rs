//! HTTP API integration tests
//!
//! Drives the router with `oneshot` requests against a temp-file database and
//! a recording dispatcher.

mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use helpers::{complete_component, create_test_db, transcript_result, RecordingDispatcher};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use speval_common::events::EventBus;
use speval_orch::config::OrchestratorSettings;
use speval_orch::models::ComponentKind;
use speval_orch::services::EvaluationService;
use speval_orch::{build_router, db, AppState};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    _dir: TempDir,
    pool: SqlitePool,
    dispatcher: Arc<RecordingDispatcher>,
    state: AppState,
}

impl TestApp {
    async fn new() -> Self {
        let (dir, pool) = create_test_db().await.unwrap();
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let event_bus = EventBus::new(100);
        let service = Arc::new(EvaluationService::new(
            pool.clone(),
            event_bus.clone(),
            dispatcher.clone(),
            &OrchestratorSettings::default(),
            5000,
        ));
        let state = AppState::new(pool.clone(), event_bus, service);
        Self {
            _dir: dir,
            pool,
            dispatcher,
            state,
        }
    }

    fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn create(&self, owner: &str) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri("/evaluations")
                .header("content-type", "application/json")
                .header("x-owner-id", owner)
                .body(Body::from(submission().to_string()))
                .unwrap(),
        )
        .await
    }

    /// Seed a parent with every component complete and write its outcome
    async fn finalized(&self, owner_id: i64) -> (Uuid, i64) {
        let (task, components) = helpers::seed_processing_task(&self.pool, owner_id).await;
        for kind in ComponentKind::ALL {
            let result = match kind {
                ComponentKind::Transcription => transcript_result(),
                _ => json!({"grammar_feedback": "ok", "content_evaluation": "ok", "pronunciation_feedback": "ok"}),
            };
            complete_component(&self.pool, &components, kind, result).await;
        }
        let outcome_id = self.state.service.finalize(task.task_id).await.unwrap();
        (task.task_id, outcome_id)
    }

    /// Read an event stream to its end; panics if it is still open after 2 s
    async fn read_events(&self, task_id: Uuid, owner: &str) -> String {
        let response = self
            .router()
            .oneshot(
                Request::builder()
                    .uri(format!("/evaluations/{}/events", task_id))
                    .header("x-owner-id", owner)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = tokio::time::timeout(Duration::from_secs(2), response.into_body().collect())
            .await
            .expect("event stream did not end")
            .unwrap()
            .to_bytes();
        String::from_utf8(body.to_vec()).unwrap()
    }

    async fn get(&self, uri: &str, owner: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().uri(uri);
        if let Some(owner) = owner {
            builder = builder.header("x-owner-id", owner);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }
}

fn submission() -> Value {
    json!({
        "topic": "Travel",
        "difficulty": "intermediate",
        "question": "Describe a memorable journey.",
        "ideal_answer": "Last summer I took the night train to Vienna.",
        "audio_path": "/uploads/recording-1.wav"
    })
}

#[tokio::test]
async fn tc_api_create_returns_202_with_task_id() {
    // Given
    let app = TestApp::new().await;

    // When: POST /evaluations
    let (status, body) = app.create("42").await;

    // Then: 202 with a PROCESSING task and wave 1 dispatched
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "PROCESSING");
    assert!(Uuid::parse_str(body["task_id"].as_str().unwrap()).is_ok());
    assert_eq!(app.dispatcher.component_jobs(), 2);

    // The model defaults when omitted
    let task_id = Uuid::parse_str(body["task_id"].as_str().unwrap()).unwrap();
    let task = db::get_task(&app.pool, task_id).await.unwrap().unwrap();
    assert_eq!(task.metadata.model, "mistral:latest");
    assert_eq!(task.owner_id, 42);
}

#[tokio::test]
async fn tc_api_create_requires_owner_header() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/evaluations")
                .header("content-type", "application/json")
                .body(Body::from(submission().to_string()))
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    assert_eq!(helpers::count_rows(&app.pool, "evaluation_tasks").await, 0);
}

#[tokio::test]
async fn tc_api_invalid_owner_header_is_bad_request() {
    let app = TestApp::new().await;
    let (status, _) = app.get("/outcomes", Some("not-a-number")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn tc_api_blank_audio_path_is_bad_request() {
    let app = TestApp::new().await;
    let mut body = submission();
    body["audio_path"] = json!("   ");

    let (status, response) = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/evaluations")
                .header("content-type", "application/json")
                .header("x-owner-id", "1")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn tc_api_status_returns_components() {
    // Given: an accepted evaluation
    let app = TestApp::new().await;
    let (_, created) = app.create("42").await;
    let task_id = created["task_id"].as_str().unwrap().to_string();

    // When
    let (status, body) = app.get(&format!("/evaluations/{}/status", task_id), Some("42")).await;

    // Then
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["task_id"], task_id.as_str());
    assert_eq!(body["status"], "PROCESSING");
    assert_eq!(body["progress"], 0);
    let components = body["components"].as_array().unwrap();
    assert_eq!(components.len(), ComponentKind::COUNT);
    assert_eq!(components[0]["component_type"], "transcription");
    assert_eq!(components[0]["status"], "PENDING");
}

#[tokio::test]
async fn tc_api_status_of_other_owner_is_not_found() {
    let app = TestApp::new().await;
    let (_, created) = app.create("42").await;
    let task_id = created["task_id"].as_str().unwrap();

    let (status, body) = app.get(&format!("/evaluations/{}/status", task_id), Some("43")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn tc_api_status_of_malformed_id_is_not_found() {
    let app = TestApp::new().await;
    let (status, _) = app.get("/evaluations/not-a-uuid/status", Some("42")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn tc_api_report_drives_wave2() {
    // Given: an evaluation with wave 1 dispatched
    let app = TestApp::new().await;
    let (_, created) = app.create("42").await;
    let task_id = Uuid::parse_str(created["task_id"].as_str().unwrap()).unwrap();
    let components = db::list_components(&app.pool, task_id).await.unwrap();
    let transcription = components
        .iter()
        .find(|c| c.kind == ComponentKind::Transcription)
        .unwrap();

    // When: a worker reports transcription through HTTP
    let (status, body) = app
        .send(
            Request::builder()
                .method("POST")
                .uri(format!("/components/{}/report", transcription.component_id))
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"status": "COMPLETED", "message": "Transcription complete.", "result": transcript_result()})
                        .to_string(),
                ))
                .unwrap(),
        )
        .await;

    // Then
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "applied");
    assert_eq!(body["status"], "COMPLETED");

    // And: once audio features complete, a status query fans out wave 2
    complete_component(&app.pool, &components, ComponentKind::AudioFeatures, json!({})).await;
    let (_, snapshot) = app
        .get(&format!("/evaluations/{}/status", task_id), Some("42"))
        .await;
    assert_eq!(snapshot["status_message"], "Text analysis tasks dispatched.");
    assert_eq!(app.dispatcher.component_jobs(), 8);
}

#[tokio::test]
async fn tc_api_report_for_unknown_component_is_not_found() {
    let app = TestApp::new().await;

    let (status, _) = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/components/9999/report")
                .header("content-type", "application/json")
                .body(Body::from(json!({"status": "FAILED", "error": "boom"}).to_string()))
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn tc_api_outcomes_list_and_fetch() {
    // Given: one finalized evaluation for owner 42
    let app = TestApp::new().await;
    let (task, components) = helpers::seed_processing_task(&app.pool, 42).await;
    for kind in ComponentKind::ALL {
        let result = match kind {
            ComponentKind::Transcription => transcript_result(),
            _ => json!({"grammar_feedback": "ok", "content_evaluation": "ok", "pronunciation_feedback": "ok"}),
        };
        complete_component(&app.pool, &components, kind, result).await;
    }
    let outcome_id = app.state.service.finalize(task.task_id).await.unwrap();

    // When: listing
    let (status, list) = app.get("/outcomes?limit=10", Some("42")).await;

    // Then
    assert_eq!(status, StatusCode::OK);
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["outcome_id"], outcome_id);
    assert_eq!(list[0]["rating"], 5.0);
    assert_eq!(list[0]["metadata"]["topic"], "Travel");

    // And: fetching by id is owner scoped
    let (status, one) = app.get(&format!("/outcomes/{}", outcome_id), Some("42")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(one["transcript"], "Last summer I took a night train to Vienna");

    let (status, _) = app.get(&format!("/outcomes/{}", outcome_id), Some("7")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn tc_api_health_reports_database() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "speval-orch");
    assert_eq!(body["database"], "ok");
}

#[tokio::test]
async fn tc_api_event_stream_is_owner_scoped() {
    let app = TestApp::new().await;
    let (_, created) = app.create("42").await;
    let task_id = created["task_id"].as_str().unwrap();

    let (status, _) = app.get(&format!("/evaluations/{}/events", task_id), Some("7")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Owner gets an event stream
    let response = app
        .router()
        .oneshot(
            Request::builder()
                .uri(format!("/evaluations/{}/events", task_id))
                .header("x-owner-id", "42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap().to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"));
}

#[tokio::test]
async fn tc_api_event_stream_ends_for_completed_task() {
    // Given: an evaluation that finished before anyone subscribed
    let app = TestApp::new().await;
    let (task_id, outcome_id) = app.finalized(42).await;

    // When
    let body = app.read_events(task_id, "42").await;

    // Then: one completion event, then the stream closes
    assert!(body.contains("event: TaskCompleted"), "body: {}", body);
    assert!(body.contains(&format!("\"outcome_id\":{}", outcome_id)), "body: {}", body);
    assert_eq!(body.matches("event:").count(), 1);
}

#[tokio::test]
async fn tc_api_event_stream_ends_for_failed_task() {
    let app = TestApp::new().await;
    let (task, _) = helpers::seed_processing_task(&app.pool, 42).await;
    assert!(db::parent_tasks::mark_failed(&app.pool, task.task_id, "Transcription error: boom")
        .await
        .unwrap());

    let body = app.read_events(task.task_id, "42").await;

    assert!(body.contains("event: TaskFailed"), "body: {}", body);
    assert!(body.contains("Transcription error: boom"));
}

#[tokio::test]
async fn tc_api_progress_report() {
    // Given: two finished evaluations for owner 42
    let app = TestApp::new().await;
    app.finalized(42).await;
    app.finalized(42).await;

    // When
    let (status, report) = app.get("/outcomes/report", Some("42")).await;

    // Then
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["owner_id"], 42);
    assert_eq!(report["period_days"], 30);
    assert_eq!(report["total_outcomes"], 2);
    assert_eq!(report["average_rating"], 5.0);
    assert_eq!(report["difficulty_breakdown"]["intermediate"]["count"], 2);
    assert_eq!(report["difficulty_breakdown"]["intermediate"]["average_rating"], 5.0);
    assert_eq!(report["improvement_trend"], "stable");

    // And: another owner sees an empty report
    let (status, empty) = app.get("/outcomes/report", Some("7")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(empty["total_outcomes"], 0);
    assert_eq!(empty["average_rating"], Value::Null);
}
