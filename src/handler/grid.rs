// src/handler/grid.rs

//! Handler for jobs submitted to an external grid scheduler.
//!
//! The handler cooperates with two signals: the shared queue status
//! snapshot (one status command per stat interval for the whole executor)
//! and the `.command.exitcode` sentinel the wrapper writes in the work
//! directory. The exit file is authoritative: once it is readable, its
//! content is the task's exit status. A job that leaves the queue, or an
//! exit file that stays unreadable past `exit_read_timeout`, completes the
//! task with a synthetic error status.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, info, warn};

use crate::errors::{GridflowError, Result};
use crate::executor::grid::{run_command, GridCommands, QueueStatus, QueueStatusCache};
use crate::handler::{HandlerStatus, TaskHandler, UNKNOWN_EXIT_STATUS};
use crate::task::{TaskOutput, TaskRun};

/// Upper bound on the submit and kill command invocations.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

pub struct GridTaskHandler {
    task: TaskRun,
    status: HandlerStatus,
    commands: Arc<dyn GridCommands>,
    queue_status: Arc<QueueStatusCache>,
    exit_read_timeout: Duration,
    job_id: Option<String>,
    /// When the job first looked finished without a readable exit file.
    exit_wait_since: Option<Instant>,
    killed: bool,
}

impl GridTaskHandler {
    pub fn new(
        task: TaskRun,
        commands: Arc<dyn GridCommands>,
        queue_status: Arc<QueueStatusCache>,
        exit_read_timeout: Duration,
    ) -> Self {
        Self {
            task,
            status: HandlerStatus::New,
            commands,
            queue_status,
            exit_read_timeout,
            job_id: None,
            exit_wait_since: None,
            killed: false,
        }
    }

    /// Backend job id, available once submitted.
    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    fn complete(&mut self, exit_status: i32) {
        self.task.exit_status = Some(exit_status);
        self.task.stdout = Some(TaskOutput::File(self.task.output_file()));
        self.status = HandlerStatus::Completed;
        debug!(
            task = %self.task.name,
            job_id = ?self.job_id,
            exit_status,
            "grid task completed"
        );
    }

    /// Parse the exit file, if it is present and readable.
    async fn read_exit_status(&self) -> Option<i32> {
        let content = tokio::fs::read_to_string(self.task.exit_file()).await.ok()?;
        content.trim().parse().ok()
    }

    /// Whether the grace period for a missing/unreadable exit file has run
    /// out, arming the timer on first use.
    fn exit_wait_expired(&mut self) -> bool {
        let since = self.exit_wait_since.get_or_insert_with(Instant::now);
        since.elapsed() > self.exit_read_timeout
    }
}

impl TaskHandler for GridTaskHandler {
    fn task(&self) -> &TaskRun {
        &self.task
    }

    fn status(&self) -> HandlerStatus {
        self.status
    }

    fn submit(&mut self) -> BoxFuture<'_, Result<()>> {
        async move {
            let wrapper = self.task.wrapper_file();
            let argv = self.commands.submit_command_line(&self.task, &wrapper)?;

            debug!(task = %self.task.name, command = ?argv, "submitting grid job");

            let output = run_command(&argv, Some(&self.task.work_dir), COMMAND_TIMEOUT)
                .await
                .map_err(|e| GridflowError::SubmitError(e.to_string()))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(GridflowError::SubmitError(format!(
                    "{} failed with exit {:?} for task '{}': {}",
                    argv[0],
                    output.status.code(),
                    self.task.name,
                    stderr.trim()
                )));
            }

            let stdout = String::from_utf8_lossy(&output.stdout);
            let job_id = self.commands.parse_job_id(&stdout)?;

            info!(task = %self.task.name, job_id = %job_id, "grid job submitted");
            self.job_id = Some(job_id);
            self.status = HandlerStatus::Submitted;
            Ok(())
        }
        .boxed()
    }

    fn check_if_running(&mut self) -> BoxFuture<'_, Result<bool>> {
        async move {
            if matches!(
                self.status,
                HandlerStatus::Running | HandlerStatus::Completed
            ) {
                return Ok(true);
            }
            if self.status != HandlerStatus::Submitted {
                return Ok(false);
            }
            let Some(job_id) = self.job_id.clone() else {
                return Ok(false);
            };

            let queue_says_running = matches!(
                self.queue_status.status_of(&job_id).await,
                Some(QueueStatus::Running)
            );

            // A fast job may finish before the queue ever reports it
            // running; the exit file settles that.
            if queue_says_running || self.task.exit_file().exists() {
                info!(task = %self.task.name, job_id = %job_id, "grid job running");
                self.status = HandlerStatus::Running;
                return Ok(true);
            }
            Ok(false)
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

            if self.task.exit_file().exists() {
                if let Some(code) = self.read_exit_status().await {
                    self.complete(code);
                    return Ok(true);
                }
                // Present but not yet readable (shared filesystem lag):
                // give it the configured grace before giving up.
                if self.exit_wait_expired() {
                    warn!(
                        task = %self.task.name,
                        job_id = ?self.job_id,
                        timeout = ?self.exit_read_timeout,
                        "exit file unreadable past the timeout; completing with error status"
                    );
                    self.complete(UNKNOWN_EXIT_STATUS);
                    return Ok(true);
                }
                return Ok(false);
            }

            let still_listed = match self.job_id.clone() {
                Some(job_id) => self.queue_status.status_of(&job_id).await.is_some(),
                None => false,
            };
            if still_listed {
                self.exit_wait_since = None;
                return Ok(false);
            }

            // Job left the queue without an exit file yet; wait out the
            // grace period before declaring it lost.
            if self.exit_wait_expired() {
                warn!(
                    task = %self.task.name,
                    job_id = ?self.job_id,
                    "grid job left the queue without writing an exit file; completing with error status"
                );
                self.complete(UNKNOWN_EXIT_STATUS);
                return Ok(true);
            }
            Ok(false)
        }
        .boxed()
    }

    fn kill(&mut self) -> BoxFuture<'_, Result<()>> {
        async move {
            if self.status == HandlerStatus::Completed || self.killed {
                return Ok(());
            }
            let Some(job_id) = self.job_id.clone() else {
                return Ok(());
            };
            self.killed = true;

            let argv = self.commands.kill_command(&job_id);
            match run_command(&argv, None, COMMAND_TIMEOUT).await {
                Ok(output) if !output.status.success() => {
                    warn!(
                        task = %self.task.name,
                        job_id = %job_id,
                        exit = ?output.status.code(),
                        "kill command failed"
                    );
                }
                Err(e) => {
                    warn!(task = %self.task.name, job_id = %job_id, error = %e, "kill command failed");
                }
                _ => {
                    debug!(task = %self.task.name, job_id = %job_id, "grid job killed");
                }
            }
            Ok(())
        }
        .boxed()
    }

    fn fail(&mut self, error: anyhow::Error) {
        debug!(task = %self.task.name, error = %error, "grid task force-completed");
        self.task.exit_status = Some(UNKNOWN_EXIT_STATUS);
        if self.task.stdout.is_none() {
            self.task.stdout = Some(TaskOutput::File(self.task.output_file()));
        }
        self.status = HandlerStatus::Completed;
    }

    fn into_task(self: Box<Self>) -> TaskRun {
        self.task
    }
}
