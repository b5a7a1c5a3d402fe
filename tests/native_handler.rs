// tests/native_handler.rs

//! Direct native handler behaviour, including cancellation and panics.

use std::time::Duration;

use gridflow::handler::{HandlerStatus, NativeTaskHandler, TaskHandler};
use gridflow::task::{TaskOutput, TaskRun};
use gridflow_test_utils::{init_tracing, with_timeout};

#[tokio::test]
async fn value_and_state_transitions_on_success() {
    init_tracing();

    let task = TaskRun::native("ok", ".", || Ok("result".to_string()));
    let mut handler = NativeTaskHandler::new(task);
    assert_eq!(handler.status(), HandlerStatus::New);

    with_timeout(handler.submit()).await.unwrap();
    assert_eq!(handler.status(), HandlerStatus::Submitted);

    assert!(with_timeout(handler.check_if_running()).await.unwrap());
    assert_eq!(handler.status(), HandlerStatus::Running);

    // The pool closure is quick; poll until it reports done.
    let mut done = false;
    for _ in 0..100 {
        if with_timeout(handler.check_if_completed()).await.unwrap() {
            done = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(done, "native task should complete");
    assert_eq!(handler.status(), HandlerStatus::Completed);

    let task = Box::new(handler).into_task();
    assert_eq!(task.exit_status, Some(0));
    assert_eq!(task.stdout, Some(TaskOutput::Value("result".to_string())));
}

#[tokio::test]
async fn panics_are_captured_as_errors() {
    init_tracing();

    let task = TaskRun::native("panicky", ".", || panic!("boom"));
    let mut handler = NativeTaskHandler::new(task);

    with_timeout(handler.submit()).await.unwrap();
    assert!(with_timeout(handler.check_if_running()).await.unwrap());

    let mut done = false;
    for _ in 0..100 {
        if with_timeout(handler.check_if_completed()).await.unwrap() {
            done = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(done);

    let task = Box::new(handler).into_task();
    assert!(task.exit_status.is_none());
    let error = task.error.expect("panic should be captured");
    assert!(error.to_string().contains("panic"));
}

#[tokio::test]
async fn kill_cancels_a_running_task() {
    init_tracing();

    // Short enough that the runtime shutdown does not dawdle on the
    // detached pool thread, long enough that kill() clearly wins the race.
    let task = TaskRun::native("sleepy", ".", || {
        std::thread::sleep(Duration::from_secs(2));
        Ok("late".to_string())
    });
    let mut handler = NativeTaskHandler::new(task);

    with_timeout(handler.submit()).await.unwrap();
    assert!(with_timeout(handler.check_if_running()).await.unwrap());

    with_timeout(handler.kill()).await.unwrap();
    // kill is idempotent.
    with_timeout(handler.kill()).await.unwrap();

    assert!(with_timeout(handler.check_if_completed()).await.unwrap());
    assert_eq!(handler.status(), HandlerStatus::Completed);

    let task = Box::new(handler).into_task();
    assert!(task.exit_status.is_none());
    assert!(task.error.is_some());
}

#[tokio::test]
async fn submitting_a_shell_task_as_native_is_refused() {
    init_tracing();

    let task = TaskRun::shell("not-native", ".", "true");
    let mut handler = NativeTaskHandler::new(task);

    assert!(with_timeout(handler.submit()).await.is_err());
}
