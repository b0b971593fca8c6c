use std::time::Duration;

use schemaflow_types::{AggregationMode, PhaseKind, SessionEvent, TaskStatus};

use crate::controller::{ControllerConfig, SessionController, StreamState};
use crate::error::SchemaflowError;
use crate::supervisor::SupervisorConfig;

fn controller() -> SessionController {
    SessionController::new(ControllerConfig::default())
}

#[tokio::test(start_paused = true)]
async fn stream_completes_automatically_after_quiescence() {
    let controller = controller();
    controller.start_streaming("s1").await.unwrap();

    let reg = controller.registry().clone();
    reg.start_task("t1", "Requirements Analysis", "analyst")
        .await
        .unwrap();
    reg.append_content("t1", "Entities: user, order. Access is keyed by user id.")
        .await;
    reg.complete_task("t1").await;

    reg.start_task("t2", "Schema Design", "architect")
        .await
        .unwrap();
    reg.append_content("t2", "```sql\nCREATE TABLE orders (id INT);\n```")
        .await;
    reg.complete_task("t2").await;

    // Quiescence grace is 2s with 500ms health checks; give the watcher
    // room to observe it.
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(controller.state().await, StreamState::Complete);
    let result = controller.final_result().await.unwrap();
    assert_eq!(result.phases.len(), 2);
    assert_eq!(result.phases[0].kind, PhaseKind::Analysis);
    assert_eq!(result.phases[1].kind, PhaseKind::Design);
    assert_eq!(result.metadata.completed_count, 2);
    assert_eq!(result.metadata.mode, AggregationMode::Auto);
}

#[tokio::test(start_paused = true)]
async fn session_completed_notification_carries_results_and_summary() {
    let controller = controller();
    let mut rx = controller.subscribe();
    controller.start_streaming("s1").await.unwrap();

    let reg = controller.registry().clone();
    reg.start_task("t1", "Schema Design", "architect")
        .await
        .unwrap();
    reg.append_content("t1", "CREATE TABLE orders (id INT);")
        .await;
    reg.complete_task("t1").await;

    tokio::time::sleep(Duration::from_secs(5)).await;

    let mut saw_init = false;
    let mut saw_chunk = false;
    let mut completed = None;
    while let Ok(event) = rx.try_recv() {
        match event {
            SessionEvent::SessionInitialized { session_id, .. } => {
                assert_eq!(session_id, "s1");
                saw_init = true;
            }
            SessionEvent::ContentChunk { task_id, .. } => {
                assert_eq!(task_id, "t1");
                saw_chunk = true;
            }
            SessionEvent::SessionCompleted {
                session_id,
                final_results,
                summary,
            } => {
                assert_eq!(session_id, "s1");
                assert_eq!(final_results.phases.len(), 1);
                assert_eq!(summary.completed, 1);
                completed = Some(final_results);
            }
            _ => {}
        }
    }
    assert!(saw_init);
    assert!(saw_chunk);
    assert!(completed.is_some());
}

#[tokio::test(start_paused = true)]
async fn force_complete_salvages_partial_content_from_active_tasks() {
    let controller = controller();
    controller.start_streaming("s1").await.unwrap();

    let reg = controller.registry().clone();
    reg.start_task("t1", "Requirements Analysis", "analyst")
        .await
        .unwrap();
    reg.append_content("t1", "Partial analysis of the order flow.")
        .await;
    reg.start_task("t2", "Schema Design", "architect")
        .await
        .unwrap();
    reg.append_content("t2", "CREATE TABLE orders (").await;

    let result = controller.force_complete().await.unwrap();

    assert_eq!(controller.state().await, StreamState::Complete);
    assert_eq!(result.phases.len(), 2);
    assert_eq!(result.metadata.completed_count, 0);
    assert_eq!(result.metadata.mode, AggregationMode::Forced);
}

#[tokio::test(start_paused = true)]
async fn force_complete_is_rejected_while_idle() {
    let controller = controller();
    let err = controller.force_complete().await.unwrap_err();
    assert!(matches!(err, SchemaflowError::InvalidState(_)));
    assert_eq!(controller.state().await, StreamState::Idle);
}

#[tokio::test(start_paused = true)]
async fn start_streaming_is_ignored_while_already_streaming() {
    let controller = controller();
    controller.start_streaming("s1").await.unwrap();

    let reg = controller.registry().clone();
    reg.start_task("t1", "Requirements Analysis", "analyst")
        .await
        .unwrap();

    // A second call mid-flight must not clobber the session.
    controller.start_streaming("s2").await.unwrap();
    assert_eq!(reg.session_id().await.as_deref(), Some("s1"));
    assert_eq!(reg.status().await.total_count, 1);
}

#[tokio::test(start_paused = true)]
async fn start_streaming_is_ignored_for_a_completed_session() {
    let controller = controller();
    controller.start_streaming("s1").await.unwrap();

    let reg = controller.registry().clone();
    reg.start_task("t1", "Schema Design", "architect")
        .await
        .unwrap();
    reg.append_content("t1", "CREATE TABLE orders (id INT);")
        .await;
    controller.force_complete().await.unwrap();

    controller.start_streaming("s1").await.unwrap();
    assert_eq!(controller.state().await, StreamState::Complete);
    assert!(controller.final_result().await.is_some());
}

#[tokio::test(start_paused = true)]
async fn completed_controller_accepts_a_fresh_session() {
    let controller = controller();
    controller.start_streaming("s1").await.unwrap();

    let reg = controller.registry().clone();
    reg.start_task("t1", "Schema Design", "architect")
        .await
        .unwrap();
    reg.append_content("t1", "CREATE TABLE orders (id INT);")
        .await;
    controller.force_complete().await.unwrap();

    controller.start_streaming("s2").await.unwrap();
    assert_eq!(controller.state().await, StreamState::Streaming);
    assert_eq!(reg.session_id().await.as_deref(), Some("s2"));
    assert_eq!(reg.status().await.total_count, 0);
}

#[tokio::test(start_paused = true)]
async fn reset_returns_to_idle_from_any_state() {
    let controller = controller();
    controller.start_streaming("s1").await.unwrap();

    let reg = controller.registry().clone();
    reg.start_task("t1", "Requirements Analysis", "analyst")
        .await
        .unwrap();

    controller.reset().await;
    assert_eq!(controller.state().await, StreamState::Idle);
    assert!(controller.final_result().await.is_none());
    assert_eq!(reg.session_id().await, None);

    // Old timers must be gone: advancing past the task deadline fires
    // nothing against the cleared registry.
    tokio::time::advance(Duration::from_secs(120)).await;
    tokio::task::yield_now().await;
    assert_eq!(reg.status().await.total_count, 0);

    // And the controller re-arms cleanly.
    controller.start_streaming("s2").await.unwrap();
    assert_eq!(controller.state().await, StreamState::Streaming);
}

#[tokio::test(start_paused = true)]
async fn supervisor_timeout_does_not_abort_the_session() {
    let config = ControllerConfig {
        supervisor: SupervisorConfig {
            task_timeout: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(5),
        },
        ..ControllerConfig::default()
    };
    let controller = SessionController::new(config);
    controller.start_streaming("s1").await.unwrap();

    let reg = controller.registry().clone();
    reg.start_task("stuck", "Requirements Analysis", "analyst")
        .await
        .unwrap();
    reg.append_content("stuck", "partial analysis that never finishes")
        .await;

    // The stuck task times out; the session then quiesces and completes on
    // its own with the task recorded as errored.
    tokio::time::sleep(Duration::from_secs(20)).await;

    assert_eq!(controller.state().await, StreamState::Complete);
    let result = controller.final_result().await.unwrap();
    assert!(result.phases.is_empty());
    assert_eq!(result.metadata.completed_count, 0);

    let status = reg.status().await;
    assert_eq!(status.tasks[0].status, TaskStatus::Error);
}
