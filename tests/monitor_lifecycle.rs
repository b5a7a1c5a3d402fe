// tests/monitor_lifecycle.rs

//! Monitor admission, polling, failure isolation and shutdown.
//!
//! These tests run with paused time, so the deliberately long poll
//! intervals (hours) complete instantly.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use gridflow::errors::GridflowError;
use gridflow::handler::{HandlerStatus, TaskHandler, UNKNOWN_EXIT_STATUS};
use gridflow::monitor::{MonitorEvent, TaskPollingMonitor};
use gridflow_test_utils::builders::session_config;
use gridflow_test_utils::fake_handler::FakeHandler;
use gridflow_test_utils::{init_tracing, with_timeout};

fn spawn_monitor(
    toml: &str,
    default_queue_size: usize,
) -> (TaskPollingMonitor, mpsc::Receiver<MonitorEvent>) {
    let (events_tx, events_rx) = mpsc::channel(16);
    let monitor = TaskPollingMonitor::spawn(
        &session_config(toml),
        "fake",
        default_queue_size,
        Duration::from_millis(100),
        events_tx,
    )
    .expect("monitor should spawn");
    (monitor, events_rx)
}

fn completed(event: MonitorEvent) -> (String, Option<i32>) {
    let MonitorEvent::TaskCompleted { task, .. } = event;
    (task.name, task.exit_status)
}

#[tokio::test(start_paused = true)]
async fn task_completes_and_fires_exactly_one_event() {
    init_tracing();

    let (monitor, mut events) = spawn_monitor(
        r#"
        [executor."$fake"]
        queue_size = 11
        poll_interval = "1h"
        dump_interval = "3h"
        "#,
        2,
    );

    assert_eq!(monitor.queue_size(), 11);
    assert_eq!(monitor.active_count(), 0);

    let handler = FakeHandler::new("alpha").completes_after(2);
    let stats = handler.stats();

    monitor.schedule(Box::new(handler)).await.unwrap();
    assert_eq!(monitor.active_count(), 1);

    let event = events.recv().await.expect("completion event");
    let MonitorEvent::TaskCompleted { executor, task } = event;
    assert_eq!(executor, "fake");
    assert_eq!(task.name, "alpha");
    assert_eq!(task.exit_status, Some(0));

    // Slot released before the event is emitted.
    assert_eq!(monitor.active_count(), 0);
    // Completed on the second poll, as scripted.
    assert_eq!(stats.completed_checks(), 2);
    // Exactly one completion event.
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn admission_blocks_while_the_queue_is_full() {
    init_tracing();

    let (monitor, _events) = spawn_monitor(
        r#"
        [executor."$fake"]
        queue_size = 1
        poll_interval = "50ms"
        "#,
        4,
    );

    monitor
        .schedule(Box::new(FakeHandler::new("first").never_completes()))
        .await
        .unwrap();
    assert_eq!(monitor.active_count(), 1);

    // The queue is full: a second admission must stay blocked.
    let blocked = tokio::time::timeout(
        Duration::from_secs(2),
        monitor.schedule(Box::new(FakeHandler::new("second"))),
    )
    .await;
    assert!(blocked.is_err(), "schedule should block on a full queue");
    assert_eq!(monitor.active_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_submit_releases_the_queue_slot() {
    init_tracing();

    let (monitor, mut events) = spawn_monitor(
        r#"
        [executor."$fake"]
        queue_size = 1
        poll_interval = "50ms"
        "#,
        4,
    );

    let err = monitor
        .schedule(Box::new(FakeHandler::new("refused").failing_submit()))
        .await
        .unwrap_err();
    assert!(matches!(err, GridflowError::SubmitError(_)));
    assert_eq!(monitor.active_count(), 0);

    // The slot is free again: the next admission goes straight through.
    monitor
        .schedule(Box::new(FakeHandler::new("accepted")))
        .await
        .unwrap();
    let (name, exit) = completed(events.recv().await.unwrap());
    assert_eq!(name, "accepted");
    assert_eq!(exit, Some(0));
}

#[tokio::test(start_paused = true)]
async fn a_failing_handler_does_not_stop_the_monitor() {
    init_tracing();

    let (monitor, mut events) = spawn_monitor(
        r#"
        [executor."$fake"]
        poll_interval = "100ms"
        "#,
        4,
    );

    monitor
        .schedule(Box::new(FakeHandler::new("broken").erroring_check()))
        .await
        .unwrap();
    monitor
        .schedule(Box::new(FakeHandler::new("healthy")))
        .await
        .unwrap();

    let (name, exit) = completed(events.recv().await.unwrap());
    assert_eq!(name, "broken");
    assert_eq!(exit, Some(UNKNOWN_EXIT_STATUS));

    let (name, exit) = completed(events.recv().await.unwrap());
    assert_eq!(name, "healthy");
    assert_eq!(exit, Some(0));

    // Still alive for further work.
    monitor
        .schedule(Box::new(FakeHandler::new("later")))
        .await
        .unwrap();
    let (name, _) = completed(events.recv().await.unwrap());
    assert_eq!(name, "later");
}

#[tokio::test(start_paused = true)]
async fn admissions_from_one_producer_complete_in_order() {
    init_tracing();

    let (monitor, mut events) = spawn_monitor(
        r#"
        [executor."$fake"]
        queue_size = 4
        poll_interval = "100ms"
        "#,
        4,
    );

    for name in ["a", "b", "c"] {
        monitor
            .schedule(Box::new(FakeHandler::new(name)))
            .await
            .unwrap();
    }

    let mut order = Vec::new();
    for _ in 0..3 {
        let (name, _) = completed(events.recv().await.unwrap());
        order.push(name);
    }
    assert_eq!(order, vec!["a", "b", "c"]);
}

#[tokio::test(start_paused = true)]
async fn shutdown_kills_active_tasks_and_rejects_new_ones() {
    init_tracing();

    let (monitor, mut events) = spawn_monitor(
        r#"
        [executor."$fake"]
        poll_interval = "100ms"
        "#,
        4,
    );

    let handler = FakeHandler::new("stuck").never_completes();
    let stats = handler.stats();
    monitor.schedule(Box::new(handler)).await.unwrap();

    monitor.shutdown().await;

    // The stuck task was killed and abandoned with an error status.
    let (name, exit) = completed(events.recv().await.unwrap());
    assert_eq!(name, "stuck");
    assert_eq!(exit, Some(UNKNOWN_EXIT_STATUS));
    assert_eq!(stats.kills(), 1);

    // Admission is rejected after shutdown.
    let err = monitor
        .schedule(Box::new(FakeHandler::new("too-late")))
        .await
        .unwrap_err();
    assert!(matches!(err, GridflowError::ShutdownError));

    // Shutdown is idempotent.
    monitor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_admission_kills_the_submitted_task() {
    init_tracing();

    let (monitor, mut events) = spawn_monitor(
        r#"
        [executor."$fake"]
        poll_interval = "100ms"
        "#,
        4,
    );
    let monitor = Arc::new(monitor);

    // An admission whose submit is still in flight when shutdown fires.
    let handler = FakeHandler::new("in-flight").slow_submit(Duration::from_secs(1));
    let stats = handler.stats();

    let admission = tokio::spawn({
        let monitor = monitor.clone();
        async move { monitor.schedule(Box::new(handler)).await }
    });

    // Let the admission take its slot and enter the slow submit.
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(monitor.active_count(), 1);

    monitor.shutdown().await;

    // The caller learns the task was not admitted, but since the backend
    // already had it, it was killed rather than leaked.
    let err = admission.await.unwrap().unwrap_err();
    assert!(matches!(err, GridflowError::ShutdownError));
    assert_eq!(stats.kills(), 1);

    // Never admitted: no completion event, and the slot is free again.
    assert!(events.try_recv().is_err());
    assert_eq!(monitor.active_count(), 0);
}

#[tokio::test]
async fn kill_and_completed_checks_are_idempotent() {
    init_tracing();

    let mut handler = FakeHandler::new("idem");
    let stats = handler.stats();

    with_timeout(handler.submit()).await.unwrap();
    assert_eq!(handler.status(), HandlerStatus::Submitted);

    // kill() N times is a no-op beyond the first effect.
    with_timeout(handler.kill()).await.unwrap();
    with_timeout(handler.kill()).await.unwrap();
    assert_eq!(stats.kills(), 2);
    assert_eq!(handler.status(), HandlerStatus::Submitted);

    // Drive to completion, then re-check: no further transitions.
    assert!(with_timeout(handler.check_if_running()).await.unwrap());
    assert!(with_timeout(handler.check_if_completed()).await.unwrap());
    assert_eq!(handler.status(), HandlerStatus::Completed);
    let polls = stats.completed_checks();

    assert!(with_timeout(handler.check_if_completed()).await.unwrap());
    assert_eq!(stats.completed_checks(), polls);
    assert_eq!(handler.status(), HandlerStatus::Completed);
}
