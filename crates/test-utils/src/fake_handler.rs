use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use gridflow::errors::{GridflowError, Result};
use gridflow::handler::{HandlerStatus, TaskHandler, UNKNOWN_EXIT_STATUS};
use gridflow::task::{TaskOutput, TaskRun};

/// Call counters shared between a [`FakeHandler`] and the test that owns
/// it, so assertions survive the handler moving into the monitor.
#[derive(Debug, Default)]
pub struct FakeHandlerStats {
    pub submits: AtomicUsize,
    pub running_checks: AtomicUsize,
    pub completed_checks: AtomicUsize,
    pub kills: AtomicUsize,
}

impl FakeHandlerStats {
    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    pub fn completed_checks(&self) -> usize {
        self.completed_checks.load(Ordering::SeqCst)
    }
}

/// A scripted handler that:
/// - records every trait call into shared stats,
/// - completes successfully after a configurable number of
///   `check_if_completed` polls (or never),
/// - can be told to refuse `submit` or to error on its checks.
pub struct FakeHandler {
    task: TaskRun,
    status: HandlerStatus,
    stats: Arc<FakeHandlerStats>,
    completes_after: Option<usize>,
    exit_status: i32,
    fail_submit: bool,
    error_on_check: bool,
    submit_delay: Option<Duration>,
}

impl FakeHandler {
    /// A handler that completes with exit 0 on the first poll.
    pub fn new(name: &str) -> Self {
        Self {
            task: TaskRun::shell(name, ".", "true"),
            status: HandlerStatus::New,
            stats: Arc::new(FakeHandlerStats::default()),
            completes_after: Some(1),
            exit_status: 0,
            fail_submit: false,
            error_on_check: false,
            submit_delay: None,
        }
    }

    /// Complete after the given number of `check_if_completed` calls.
    pub fn completes_after(mut self, polls: usize) -> Self {
        self.completes_after = Some(polls);
        self
    }

    /// Never complete on its own; only `fail` or shutdown finish it.
    pub fn never_completes(mut self) -> Self {
        self.completes_after = None;
        self
    }

    pub fn exit_status(mut self, code: i32) -> Self {
        self.exit_status = code;
        self
    }

    /// Make `submit` return a `SubmitError`.
    pub fn failing_submit(mut self) -> Self {
        self.fail_submit = true;
        self
    }

    /// Make `check_if_completed` return an error instead of a verdict.
    pub fn erroring_check(mut self) -> Self {
        self.error_on_check = true;
        self
    }

    /// Make `submit` take this long before succeeding, to widen the
    /// admission window for race tests.
    pub fn slow_submit(mut self, delay: Duration) -> Self {
        self.submit_delay = Some(delay);
        self
    }

    pub fn stats(&self) -> Arc<FakeHandlerStats> {
        self.stats.clone()
    }
}

impl TaskHandler for FakeHandler {
    fn task(&self) -> &TaskRun {
        &self.task
    }

    fn status(&self) -> HandlerStatus {
        self.status
    }

    fn submit(&mut self) -> BoxFuture<'_, Result<()>> {
        async move {
            self.stats.submits.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.submit_delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_submit {
                return Err(GridflowError::SubmitError(format!(
                    "fake backend refused task '{}'",
                    self.task.name
                )));
            }
            self.status = HandlerStatus::Submitted;
            Ok(())
        }
        .boxed()
    }

    fn check_if_running(&mut self) -> BoxFuture<'_, Result<bool>> {
        async move {
            self.stats.running_checks.fetch_add(1, Ordering::SeqCst);
            if self.status == HandlerStatus::Submitted {
                self.status = HandlerStatus::Running;
            }
            Ok(matches!(
                self.status,
                HandlerStatus::Running | HandlerStatus::Completed
            ))
        }
        .boxed()
    }

    fn check_if_completed(&mut self) -> BoxFuture<'_, Result<bool>> {
        async move {
            if self.status == HandlerStatus::Completed {
                return Ok(true);
            }
            let polls = self.stats.completed_checks.fetch_add(1, Ordering::SeqCst) + 1;

            if self.error_on_check {
                return Err(GridflowError::ExecError(format!(
                    "fake backend check failed for task '{}'",
                    self.task.name
                )));
            }

            match self.completes_after {
                Some(required) if polls >= required => {
                    self.task.exit_status = Some(self.exit_status);
                    self.task.stdout = Some(TaskOutput::Value(String::new()));
                    self.status = HandlerStatus::Completed;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }
        .boxed()
    }

    fn kill(&mut self) -> BoxFuture<'_, Result<()>> {
        async move {
            self.stats.kills.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        .boxed()
    }

    fn fail(&mut self, _error: anyhow::Error) {
        self.task.exit_status = Some(UNKNOWN_EXIT_STATUS);
        self.status = HandlerStatus::Completed;
    }

    fn into_task(self: Box<Self>) -> TaskRun {
        self.task
    }
}
