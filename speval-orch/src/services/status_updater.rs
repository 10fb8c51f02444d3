//! Status updater
//!
//! The single write path for component status, result and error. Workers call
//! it; nothing else writes component status columns.

use serde::Serialize;
use speval_common::events::{EvalEvent, EventBus};
use speval_common::{Error, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db;
use crate::models::TaskStatus;
use crate::utils::retry_on_lock;

/// Worker report for one component
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentReport {
    pub status: TaskStatus,
    pub message: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl ComponentReport {
    pub fn processing(message: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Processing,
            message: Some(message.into()),
            result: None,
            error: None,
        }
    }

    pub fn completed(result: serde_json::Value, message: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Completed,
            message: Some(message.into()),
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Failed,
            message: Some("Failed.".to_string()),
            result: None,
            error: Some(error.into()),
        }
    }
}

/// What a report did to the stored row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReportOutcome {
    /// Row updated
    Applied { parent_task_id: Uuid, status: TaskStatus },
    /// Component was already terminal; row left as it was
    AlreadyTerminal { parent_task_id: Uuid, current: TaskStatus },
    /// No such component; report dropped
    NotFound,
}

#[derive(Clone)]
pub struct StatusUpdater {
    db: SqlitePool,
    event_bus: EventBus,
    max_lock_wait_ms: u64,
}

impl StatusUpdater {
    pub fn new(db: SqlitePool, event_bus: EventBus, max_lock_wait_ms: u64) -> Self {
        Self {
            db,
            event_bus,
            max_lock_wait_ms,
        }
    }

    /// Apply a worker report
    ///
    /// Terminal components are never changed again: repeating the same terminal
    /// report is a no-op and a conflicting one is ignored with a warning. A
    /// missing component is logged and reported as `NotFound`, never an error.
    pub async fn report(&self, component_id: i64, report: ComponentReport) -> Result<ReportOutcome> {
        if report.status == TaskStatus::Pending {
            return Err(Error::InvalidInput(
                "Components cannot be reported back to PENDING".to_string(),
            ));
        }

        let applied = retry_on_lock("report_component", self.max_lock_wait_ms, || {
            db::components::write_component_status(
                &self.db,
                component_id,
                report.status,
                report.message.as_deref(),
                report.result.as_ref(),
                report.error.as_deref(),
            )
        })
        .await?;

        let Some(component) = db::get_component(&self.db, component_id).await? else {
            tracing::warn!(component_id, status = %report.status, "Status report for unknown component ignored");
            return Ok(ReportOutcome::NotFound);
        };

        if !applied {
            if component.status == report.status {
                tracing::debug!(component_id, status = %report.status, "Repeated terminal report ignored");
            } else {
                tracing::warn!(
                    component_id,
                    current = %component.status,
                    reported = %report.status,
                    "Report for terminal component ignored"
                );
            }
            return Ok(ReportOutcome::AlreadyTerminal {
                parent_task_id: component.parent_task_id,
                current: component.status,
            });
        }

        tracing::debug!(
            task_id = %component.parent_task_id,
            component_id,
            kind = %component.kind,
            status = %component.status,
            "Component status updated"
        );

        self.event_bus.emit_lossy(EvalEvent::ComponentReported {
            task_id: component.parent_task_id.to_string(),
            component_id,
            component_kind: component.kind.to_string(),
            status: component.status.to_string(),
            timestamp: chrono::Utc::now(),
        });

        Ok(ReportOutcome::Applied {
            parent_task_id: component.parent_task_id,
            status: component.status,
        })
    }
}
