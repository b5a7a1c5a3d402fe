// src/handler/native.rs

//! Handler for native in-process tasks.
//!
//! The deferred computation is submitted to the shared blocking pool. On
//! completion, a normal return becomes the task's stdout value; an error
//! or a panic becomes the task's error. Exactly one of the two is set.

use anyhow::anyhow;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, trace};

use crate::errors::{GridflowError, Result};
use crate::handler::{HandlerStatus, TaskHandler};
use crate::task::{TaskOutput, TaskRun};

pub struct NativeTaskHandler {
    task: TaskRun,
    status: HandlerStatus,
    handle: Option<tokio::task::JoinHandle<anyhow::Result<String>>>,
    killed: bool,
}

impl NativeTaskHandler {
    pub fn new(task: TaskRun) -> Self {
        Self {
            task,
            status: HandlerStatus::New,
            handle: None,
            killed: false,
        }
    }

    fn record_outcome(&mut self, outcome: std::result::Result<anyhow::Result<String>, tokio::task::JoinError>) {
        match outcome {
            Ok(Ok(value)) => {
                self.task.stdout = Some(TaskOutput::Value(value));
                self.task.exit_status = Some(0);
            }
            Ok(Err(error)) => {
                self.task.error = Some(error);
            }
            Err(join_error) if join_error.is_cancelled() => {
                self.task.error = Some(anyhow!("native task was cancelled"));
            }
            Err(join_error) => {
                self.task.error = Some(anyhow!("native task panicked: {}", join_error));
            }
        }
        self.status = HandlerStatus::Completed;
        debug!(
            task = %self.task.name,
            ok = self.task.error.is_none(),
            "native task completed"
        );
    }
}

impl TaskHandler for NativeTaskHandler {
    fn task(&self) -> &TaskRun {
        &self.task
    }

    fn status(&self) -> HandlerStatus {
        self.status
    }

    fn submit(&mut self) -> BoxFuture<'_, Result<()>> {
        async move {
            let code = self.task.take_native_code().ok_or_else(|| {
                GridflowError::SubmitError(format!(
                    "task '{}' has no native code to run",
                    self.task.name
                ))
            })?;
            self.handle = Some(tokio::task::spawn_blocking(code));
            self.status = HandlerStatus::Submitted;
            trace!(task = %self.task.name, "native task submitted to worker pool");
            Ok(())
        }
        .boxed()
    }

    fn check_if_running(&mut self) -> BoxFuture<'_, Result<bool>> {
        async move {
            // The worker pool accepted the closure at submit time.
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
            if self.status != HandlerStatus::Running {
                return Ok(false);
            }

            let finished = self
                .handle
                .as_ref()
                .map(|h| h.is_finished())
                .unwrap_or(false);

            if finished {
                if let Some(handle) = self.handle.take() {
                    let outcome = handle.await;
                    self.record_outcome(outcome);
                    return Ok(true);
                }
            }

            if self.killed {
                // A closure already running on the pool cannot be
                // interrupted; detach it and report the cancellation.
                self.handle = None;
                self.task.error = Some(anyhow!("native task was cancelled"));
                self.status = HandlerStatus::Completed;
                return Ok(true);
            }

            Ok(false)
        }
        .boxed()
    }

    fn kill(&mut self) -> BoxFuture<'_, Result<()>> {
        async move {
            if self.status == HandlerStatus::Completed {
                return Ok(());
            }
            if let Some(handle) = self.handle.as_ref() {
                handle.abort();
            }
            self.killed = true;
            Ok(())
        }
        .boxed()
    }

    fn fail(&mut self, error: anyhow::Error) {
        debug!(task = %self.task.name, error = %error, "native task force-completed");
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.task.error = Some(error);
        self.status = HandlerStatus::Completed;
    }

    fn into_task(self: Box<Self>) -> TaskRun {
        self.task
    }
}
