// src/handler/local.rs

//! Handler for tasks executed as child processes on the local machine.

use std::process::Stdio;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::{debug, trace, warn};

use crate::errors::{GridflowError, Result};
use crate::handler::{HandlerStatus, TaskHandler, TIMEOUT_EXIT_STATUS, UNKNOWN_EXIT_STATUS};
use crate::task::{TaskOutput, TaskRun, WRAPPER_FILE_NAME};

/// How long to wait for the OS to report an exit status after a
/// max_duration kill before falling back to the 143 sentinel.
const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(1);

/// Drives a task as a forked child process.
///
/// The child runs with the task work directory as CWD; stderr is merged
/// into stdout and both are redirected to the `.command.out` capture file.
/// Optional stdin bytes are piped from a background task.
pub struct LocalTaskHandler {
    task: TaskRun,
    status: HandlerStatus,
    child: Option<Child>,
    submitted_at: Option<Instant>,
    max_duration: Option<Duration>,
    stdin_writer: Option<tokio::task::JoinHandle<()>>,
}

impl LocalTaskHandler {
    pub fn new(task: TaskRun) -> Result<Self> {
        let max_duration = task.config.effective_max_duration()?;
        Ok(Self {
            task,
            status: HandlerStatus::New,
            child: None,
            submitted_at: None,
            max_duration,
            stdin_writer: None,
        })
    }

    fn complete(&mut self, exit_status: i32) {
        self.task.exit_status = Some(exit_status);
        self.task.stdout = Some(TaskOutput::File(self.task.output_file()));
        self.status = HandlerStatus::Completed;
        // Dropping the child closes its remaining stream handles.
        self.child = None;
        if let Some(writer) = self.stdin_writer.take() {
            writer.abort();
        }
        debug!(task = %self.task.name, exit_status, "local task completed");
    }
}

impl TaskHandler for LocalTaskHandler {
    fn task(&self) -> &TaskRun {
        &self.task
    }

    fn status(&self) -> HandlerStatus {
        self.status
    }

    fn submit(&mut self) -> BoxFuture<'_, Result<()>> {
        async move {
            let out = std::fs::File::create(self.task.output_file()).map_err(|e| {
                GridflowError::SubmitError(format!(
                    "creating output file for task '{}': {}",
                    self.task.name, e
                ))
            })?;
            let err = out.try_clone().map_err(GridflowError::IoError)?;

            let shell = &self.task.config.shell;
            let Some((program, args)) = shell.split_first() else {
                return Err(GridflowError::SubmitError(format!(
                    "task '{}' has an empty shell command",
                    self.task.name
                )));
            };

            let mut cmd = Command::new(program);
            cmd.args(args)
                .arg(WRAPPER_FILE_NAME)
                .current_dir(&self.task.work_dir)
                .stdout(Stdio::from(out))
                .stderr(Stdio::from(err))
                .stdin(if self.task.stdin.is_some() {
                    Stdio::piped()
                } else {
                    Stdio::null()
                })
                .kill_on_drop(true);

            let mut child = cmd.spawn().map_err(|e| {
                GridflowError::SubmitError(format!(
                    "spawning process for task '{}': {}",
                    self.task.name, e
                ))
            })?;

            if let Some(bytes) = self.task.stdin.clone() {
                if let Some(mut stdin) = child.stdin.take() {
                    let task_name = self.task.name.clone();
                    self.stdin_writer = Some(tokio::spawn(async move {
                        if let Err(e) = stdin.write_all(&bytes).await {
                            warn!(
                                task = %task_name,
                                error = %e,
                                "failed to pipe stdin to child process"
                            );
                        }
                        // Dropping the handle closes the child's stdin.
                    }));
                }
            }

            debug!(
                task = %self.task.name,
                pid = ?child.id(),
                work_dir = %self.task.work_dir.display(),
                "local task process spawned"
            );

            self.child = Some(child);
            self.submitted_at = Some(Instant::now());
            self.status = HandlerStatus::Submitted;
            Ok(())
        }
        .boxed()
    }

    fn check_if_running(&mut self) -> BoxFuture<'_, Result<bool>> {
        async move {
            // The child is observable as soon as it has been spawned.
            if self.status == HandlerStatus::Submitted {
                trace!(task = %self.task.name, "local task running");
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

            let max_duration = self.max_duration;
            let submitted_at = self.submitted_at;

            let exit = {
                let Some(child) = self.child.as_mut() else {
                    return Ok(false);
                };

                match child.try_wait()? {
                    Some(status) => Some(status.code().unwrap_or(-1)),
                    None => {
                        let expired = matches!(
                            (max_duration, submitted_at),
                            (Some(limit), Some(started)) if started.elapsed() > limit
                        );
                        if expired {
                            warn!(
                                task = %self.task.name,
                                max_duration = ?max_duration,
                                "task exceeded max_duration; killing process"
                            );
                            let _ = child.start_kill();
                            // Give the OS a moment to reap the child; fall
                            // back to the kill sentinel otherwise.
                            match tokio::time::timeout(KILL_REAP_TIMEOUT, child.wait()).await {
                                Ok(Ok(status)) => {
                                    Some(status.code().unwrap_or(TIMEOUT_EXIT_STATUS))
                                }
                                _ => Some(TIMEOUT_EXIT_STATUS),
                            }
                        } else {
                            None
                        }
                    }
                }
            };

            match exit {
                Some(code) => {
                    self.complete(code);
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        .boxed()
    }

    fn kill(&mut self) -> BoxFuture<'_, Result<()>> {
        async move {
            if self.status == HandlerStatus::Completed {
                return Ok(());
            }
            if let Some(child) = self.child.as_mut() {
                if let Err(e) = child.start_kill() {
                    debug!(task = %self.task.name, error = %e, "child process already gone");
                }
            }
            if let Some(writer) = self.stdin_writer.take() {
                writer.abort();
            }
            Ok(())
        }
        .boxed()
    }

    fn fail(&mut self, error: anyhow::Error) {
        debug!(task = %self.task.name, error = %error, "local task force-completed");
        self.task.exit_status = Some(UNKNOWN_EXIT_STATUS);
        if self.task.stdout.is_none() {
            self.task.stdout = Some(TaskOutput::File(self.task.output_file()));
        }
        self.status = HandlerStatus::Completed;
        self.child = None;
        if let Some(writer) = self.stdin_writer.take() {
            writer.abort();
        }
    }

    fn into_task(self: Box<Self>) -> TaskRun {
        self.task
    }
}
