//! Component record store tests
//!
//! Creation atomicity, kind uniqueness and the guarded parent transitions.

mod helpers;

use chrono::Utc;
use helpers::{count_rows, create_test_db, sample_metadata, seed_processing_task};
use speval_common::Error;
use speval_orch::db;
use speval_orch::models::{ComponentKind, DispatchMarker, TaskStatus};
use std::collections::HashSet;

#[tokio::test]
async fn tc_create_task_creates_one_component_per_kind() {
    // Given: an empty store
    let (_dir, pool) = create_test_db().await.unwrap();

    // When: a task is created with the full kind enumeration
    let (task, components) = db::create_task(&pool, 7, sample_metadata(), &ComponentKind::ALL)
        .await
        .unwrap();

    // Then: the stored kinds equal the enumeration, each once, all PENDING
    let stored = db::list_components(&pool, task.task_id).await.unwrap();
    assert_eq!(stored.len(), ComponentKind::COUNT);
    let kinds: HashSet<_> = stored.iter().map(|c| c.kind).collect();
    assert_eq!(kinds, ComponentKind::ALL.into_iter().collect::<HashSet<_>>());
    assert!(stored.iter().all(|c| c.status == TaskStatus::Pending));
    assert_eq!(
        stored.iter().map(|c| c.component_id).collect::<Vec<_>>(),
        components.iter().map(|c| c.component_id).collect::<Vec<_>>()
    );

    let loaded = db::get_task(&pool, task.task_id).await.unwrap().unwrap();
    assert_eq!(loaded.status, TaskStatus::Pending);
    assert_eq!(loaded.owner_id, 7);
    assert_eq!(loaded.metadata, sample_metadata());
    assert!(loaded.completed_at.is_none());
}

#[tokio::test]
async fn tc_duplicate_kinds_rejected_without_rows() {
    let (_dir, pool) = create_test_db().await.unwrap();

    let result = db::create_task(
        &pool,
        1,
        sample_metadata(),
        &[ComponentKind::Grammar, ComponentKind::Transcription, ComponentKind::Grammar],
    )
    .await;

    assert!(matches!(result, Err(Error::InvalidInput(_))));
    assert_eq!(count_rows(&pool, "evaluation_tasks").await, 0);
    assert_eq!(count_rows(&pool, "evaluation_components").await, 0);
}

#[tokio::test]
async fn tc_same_kind_under_two_parents_is_allowed() {
    let (_dir, pool) = create_test_db().await.unwrap();

    db::create_task(&pool, 1, sample_metadata(), &ComponentKind::ALL).await.unwrap();
    db::create_task(&pool, 1, sample_metadata(), &ComponentKind::ALL).await.unwrap();

    assert_eq!(count_rows(&pool, "evaluation_components").await, 2 * ComponentKind::COUNT as i64);
}

#[tokio::test]
async fn tc_owner_scoped_lookup() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let (task, _) = db::create_task(&pool, 5, sample_metadata(), &ComponentKind::ALL).await.unwrap();

    assert!(db::get_task_for_owner(&pool, task.task_id, 5).await.unwrap().is_some());
    assert!(db::get_task_for_owner(&pool, task.task_id, 6).await.unwrap().is_none());
    assert!(db::get_task(&pool, uuid::Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn tc_progress_never_decreases() {
    // Given: a PROCESSING task at 44%
    let (_dir, pool) = create_test_db().await.unwrap();
    let (task, _) = seed_processing_task(&pool, 1).await;
    db::parent_tasks::update_progress(&pool, task.task_id, 44, "4/8 components processed.")
        .await
        .unwrap();

    // When: a stale evaluator writes a lower value
    db::parent_tasks::update_progress(&pool, task.task_id, 22, "2/8 components processed.")
        .await
        .unwrap();

    // Then: progress stays at the maximum seen
    let loaded = db::get_task(&pool, task.task_id).await.unwrap().unwrap();
    assert_eq!(loaded.progress, 44);
}

#[tokio::test]
async fn tc_failed_parent_is_never_reopened() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let (task, _) = seed_processing_task(&pool, 1).await;

    assert!(db::parent_tasks::mark_failed(&pool, task.task_id, "boom").await.unwrap());
    assert!(!db::parent_tasks::mark_failed(&pool, task.task_id, "again").await.unwrap());
    assert!(!db::parent_tasks::mark_processing(&pool, task.task_id, "retry").await.unwrap());
    assert!(!db::parent_tasks::update_progress(&pool, task.task_id, 50, "x").await.unwrap());

    let loaded = db::get_task(&pool, task.task_id).await.unwrap().unwrap();
    assert_eq!(loaded.status, TaskStatus::Failed);
    assert_eq!(loaded.error_message.as_deref(), Some("boom"));
    assert!(loaded.completed_at.is_some());
}

#[tokio::test]
async fn tc_dispatch_marker_claim_is_exclusive() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let (task, _) = seed_processing_task(&pool, 1).await;

    let first = db::parent_tasks::claim_dispatch_marker(&pool, task.task_id, None, DispatchMarker::Wave2Dispatched, 22, "a")
        .await
        .unwrap();
    let second = db::parent_tasks::claim_dispatch_marker(&pool, task.task_id, None, DispatchMarker::Wave2Dispatched, 22, "b")
        .await
        .unwrap();
    assert!(first);
    assert!(!second);

    let advanced = db::parent_tasks::claim_dispatch_marker(
        &pool,
        task.task_id,
        Some(DispatchMarker::Wave2Dispatched),
        DispatchMarker::SummaryEnqueued,
        95,
        "c",
    )
    .await
    .unwrap();
    assert!(advanced);

    let loaded = db::get_task(&pool, task.task_id).await.unwrap().unwrap();
    assert_eq!(loaded.dispatch_marker, Some(DispatchMarker::SummaryEnqueued));
    assert_eq!(loaded.progress, 95);
    assert_eq!(loaded.status_message.as_deref(), Some("c"));
}

#[tokio::test]
async fn tc_purge_removes_only_old_finished_tasks() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let (finished, _) = seed_processing_task(&pool, 1).await;
    let (running, _) = seed_processing_task(&pool, 1).await;
    db::parent_tasks::mark_failed(&pool, finished.task_id, "boom").await.unwrap();

    // Cutoff in the past keeps everything
    let kept = db::parent_tasks::purge_finished_before(&pool, Utc::now() - chrono::Duration::days(7))
        .await
        .unwrap();
    assert_eq!(kept, 0);

    // Cutoff in the future removes the finished task only
    let purged = db::parent_tasks::purge_finished_before(&pool, Utc::now() + chrono::Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(purged, 1);
    assert!(db::get_task(&pool, finished.task_id).await.unwrap().is_none());
    assert!(db::list_components(&pool, finished.task_id).await.unwrap().is_empty());
    assert!(db::get_task(&pool, running.task_id).await.unwrap().is_some());
    assert_eq!(count_rows(&pool, "evaluation_components").await, ComponentKind::COUNT as i64);
}

#[tokio::test]
async fn tc_stale_pending_tasks_failed_at_startup() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let (pending, _) = db::create_task(&pool, 1, sample_metadata(), &ComponentKind::ALL).await.unwrap();
    let (processing, _) = seed_processing_task(&pool, 1).await;

    let failed = db::parent_tasks::fail_stale_pending(
        &pool,
        Utc::now() + chrono::Duration::seconds(1),
        "Evaluation interrupted before dispatch",
    )
    .await
    .unwrap();

    assert_eq!(failed, 1);
    let pending = db::get_task(&pool, pending.task_id).await.unwrap().unwrap();
    assert_eq!(pending.status, TaskStatus::Failed);
    let processing = db::get_task(&pool, processing.task_id).await.unwrap().unwrap();
    assert_eq!(processing.status, TaskStatus::Processing);
}
