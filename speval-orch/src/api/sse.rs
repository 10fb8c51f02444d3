//! Server-Sent Events for evaluation progress
//!
//! GET /evaluations/:task_id/events streams the task's `EvalEvent`s so clients
//! can watch progress without polling. Status queries remain what advances
//! the pipeline.

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use speval_common::events::EvalEvent;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{parse_task_id, OwnerId};
use crate::error::{ApiError, ApiResult};
use crate::models::TaskStatus;
use crate::AppState;

fn event_type(event: &EvalEvent) -> &'static str {
    match event {
        EvalEvent::TaskCreated { .. } => "TaskCreated",
        EvalEvent::ComponentReported { .. } => "ComponentReported",
        EvalEvent::Wave2Dispatched { .. } => "Wave2Dispatched",
        EvalEvent::TaskProgress { .. } => "TaskProgress",
        EvalEvent::TaskCompleted { .. } => "TaskCompleted",
        EvalEvent::TaskFailed { .. } => "TaskFailed",
    }
}

/// Terminal event for a task that has already finished
async fn settled_event(state: &AppState, task_id: Uuid) -> ApiResult<Option<EvalEvent>> {
    let Some(task) = crate::db::get_task(&state.db, task_id).await? else {
        return Ok(None);
    };
    let timestamp = task.completed_at.unwrap_or(task.updated_at);

    let event = match task.status {
        TaskStatus::Completed => {
            let outcome = crate::db::outcomes::get_outcome_by_task(&state.db, task_id).await?;
            outcome.map(|record| EvalEvent::TaskCompleted {
                task_id: task_id.to_string(),
                outcome_id: record.outcome_id,
                rating: record.outcome.rating,
                timestamp,
            })
        }
        TaskStatus::Failed => Some(EvalEvent::TaskFailed {
            task_id: task_id.to_string(),
            error: task.error_message.unwrap_or_default(),
            timestamp,
        }),
        _ => None,
    };
    Ok(event)
}

/// GET /evaluations/:task_id/events
///
/// A task that is already COMPLETED or FAILED gets its terminal event once and
/// the stream ends.
pub async fn evaluation_event_stream(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(task_id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let task_id = parse_task_id(&task_id)?;
    if crate::db::get_task_for_owner(&state.db, task_id, owner_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Evaluation task {}", task_id)));
    }

    let mut rx = state.event_bus.subscribe();
    let wanted = task_id.to_string();
    let settled = settled_event(&state, task_id).await?;
    debug!(task_id = %task_id, settled = settled.is_some(), "SSE client subscribed");

    let stream = async_stream::stream! {
        if let Some(event) = settled {
            match serde_json::to_string(&event) {
                Ok(json) => yield Ok(Event::default().event(event_type(&event)).data(json)),
                Err(e) => warn!("SSE: Failed to serialize event: {}", e),
            }
        } else {
            loop {
                match rx.recv().await {
                    Ok(event) if event.task_id() == wanted => {
                        let terminal = matches!(event, EvalEvent::TaskCompleted { .. } | EvalEvent::TaskFailed { .. });
                        match serde_json::to_string(&event) {
                            Ok(json) => yield Ok(Event::default().event(event_type(&event)).data(json)),
                            Err(e) => warn!("SSE: Failed to serialize event: {}", e),
                        }
                        if terminal {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "SSE: Subscriber lagged, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    ))
}
