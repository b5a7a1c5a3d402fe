// tests/session.rs

//! Session-level wiring: work directory layout and the monitor registry.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use gridflow_test_utils::builders::test_session;
use gridflow_test_utils::fake_handler::FakeHandler;
use gridflow_test_utils::init_tracing;

#[tokio::test]
async fn work_dirs_are_split_on_the_first_two_hash_characters() {
    init_tracing();

    let (session, _events) = test_session("", "/work");

    assert_eq!(
        session.work_dir_for("ab12cd34"),
        PathBuf::from("/work/ab/12cd34")
    );
    assert_eq!(session.work_dir_for("ff"), PathBuf::from("/work/ff"));
}

#[tokio::test(start_paused = true)]
async fn one_monitor_per_executor_name() {
    init_tracing();

    let (session, _events) = test_session("", "/work");

    let first = session
        .monitor_for("local", 4, Duration::from_millis(100))
        .await
        .unwrap();
    let second = session
        .monitor_for("local", 99, Duration::from_secs(9))
        .await
        .unwrap();
    let other = session
        .monitor_for("sge", 4, Duration::from_millis(100))
        .await
        .unwrap();

    // Same executor name: same monitor, first creation wins.
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.queue_size(), 4);
    assert!(!Arc::ptr_eq(&first, &other));
}

#[tokio::test(start_paused = true)]
async fn session_shutdown_stops_every_monitor() {
    init_tracing();

    let (session, mut events) = test_session("", "/work");

    let local = session
        .monitor_for("local", 4, Duration::from_millis(100))
        .await
        .unwrap();
    let grid = session
        .monitor_for("sge", 4, Duration::from_millis(100))
        .await
        .unwrap();

    local
        .schedule(Box::new(FakeHandler::new("stuck").never_completes()))
        .await
        .unwrap();

    session.shutdown().await;
    // Idempotent.
    session.shutdown().await;

    // The stuck task was abandoned with a completion event.
    assert!(events.recv().await.is_some());

    // Both monitors reject admission now.
    assert!(local.schedule(Box::new(FakeHandler::new("l"))).await.is_err());
    assert!(grid.schedule(Box::new(FakeHandler::new("g"))).await.is_err());
}
