// src/executor/grid.rs

//! Grid executor plumbing: the backend command contract, the shared queue
//! status cache, and the bounded external-command runner.
//!
//! A grid backend (SGE, and friends) is described entirely by the
//! [`GridCommands`] trait: how to shape a submit command line, how to pull
//! the job id out of the submit output, how to kill a job, and how to ask
//! for and parse the queue status. The executor and handler code is
//! backend-agnostic on top of that.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::process::Command;
use tracing::{trace, warn};

use crate::errors::{GridflowError, Result};
use crate::executor::Executor;
use crate::handler::GridTaskHandler;
use crate::session::Session;
use crate::task::{TaskBody, TaskRun};
use crate::wrapper::BashWrapperBuilder;

/// Default monitor queue capacity for grid executors.
pub const DEFAULT_GRID_QUEUE_SIZE: usize = 100;
/// Default monitor poll interval for grid executors.
pub const DEFAULT_GRID_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Default interval between queue status refreshes.
pub const DEFAULT_QUEUE_STAT_INTERVAL: Duration = Duration::from_secs(60);
/// Default grace before an unreadable exit file is treated as an error.
pub const DEFAULT_EXIT_READ_TIMEOUT: Duration = Duration::from_secs(90);

/// Upper bound on any single backend command invocation.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// State of a job as reported by the backend queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    Running,
    Pending,
    Hold,
    Error,
    Unknown,
}

/// Command shaping and response parsing for one grid backend.
pub trait GridCommands: Send + Sync {
    /// Tokens of the submit command for `task`, referencing the wrapper
    /// script.
    fn submit_command_line(&self, task: &TaskRun, wrapper: &Path) -> Result<Vec<String>>;

    /// Extract the backend job id from the submit command's output.
    fn parse_job_id(&self, output: &str) -> Result<String>;

    /// Tokens of the command that force-terminates `job_id`.
    fn kill_command(&self, job_id: &str) -> Vec<String>;

    /// Tokens of the queue status command, optionally restricted to one
    /// queue.
    fn queue_status_command(&self, queue: Option<&str>) -> Vec<String>;

    /// Parse the queue status output into a job-id → status map. Parse
    /// problems must not panic: unparseable lines are skipped and jobs
    /// missing from the result are treated as no longer queued.
    fn parse_queue_status(&self, output: &str) -> HashMap<String, QueueStatus>;
}

/// Run an external backend command with a bounded wait.
///
/// Returns the command's captured output; a command that outlives the
/// bound is killed and reported as a timeout.
pub(crate) async fn run_command(
    argv: &[String],
    cwd: Option<&Path>,
    timeout: Duration,
) -> Result<std::process::Output> {
    let Some((program, args)) = argv.split_first() else {
        return Err(GridflowError::ExecError("empty command line".to_string()));
    };

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let child = cmd
        .spawn()
        .map_err(|e| GridflowError::ExecError(format!("spawning {}: {}", program, e)))?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(GridflowError::ExecError(format!(
            "waiting for {}: {}",
            program, e
        ))),
        Err(_) => Err(GridflowError::TimeoutError(format!(
            "command {} did not finish within {:?}",
            program, timeout
        ))),
    }
}

struct CacheState {
    fetched_at: Option<Instant>,
    statuses: HashMap<String, QueueStatus>,
}

/// Shared queue status snapshot for one grid executor.
///
/// All handlers of the executor consult the same cache, so N active jobs
/// cost one status command per `stat_interval` rather than N. A failed
/// refresh keeps the previous snapshot and is retried on the next
/// interval.
pub struct QueueStatusCache {
    commands: Arc<dyn GridCommands>,
    queue: Option<String>,
    stat_interval: Duration,
    state: tokio::sync::Mutex<CacheState>,
}

impl QueueStatusCache {
    pub fn new(
        commands: Arc<dyn GridCommands>,
        queue: Option<String>,
        stat_interval: Duration,
    ) -> Self {
        Self {
            commands,
            queue,
            stat_interval,
            state: tokio::sync::Mutex::new(CacheState {
                fetched_at: None,
                statuses: HashMap::new(),
            }),
        }
    }

    /// Status of `job_id` in the freshest snapshot, refreshing it first if
    /// the stat interval has elapsed. `None` means the job is not listed.
    pub async fn status_of(&self, job_id: &str) -> Option<QueueStatus> {
        let mut state = self.state.lock().await;

        let stale = state
            .fetched_at
            .map(|at| at.elapsed() >= self.stat_interval)
            .unwrap_or(true);

        if stale {
            let argv = self.commands.queue_status_command(self.queue.as_deref());
            match run_command(&argv, None, COMMAND_TIMEOUT).await {
                Ok(output) if output.status.success() => {
                    let text = String::from_utf8_lossy(&output.stdout);
                    state.statuses = self.commands.parse_queue_status(&text);
                    trace!(jobs = state.statuses.len(), "queue status refreshed");
                }
                Ok(output) => {
                    warn!(
                        exit = ?output.status.code(),
                        "queue status command failed; keeping previous snapshot"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "queue status command failed; keeping previous snapshot");
                }
            }
            // Back off until the next interval even after a failure.
            state.fetched_at = Some(Instant::now());
        }

        state.statuses.get(job_id).copied()
    }
}

/// Executor that submits tasks to an external grid scheduler.
pub struct GridExecutor {
    session: Arc<Session>,
    name: String,
    commands: Arc<dyn GridCommands>,
    queue_status: Arc<QueueStatusCache>,
}

impl GridExecutor {
    /// Create a grid executor named `name`, backed by the given command
    /// set. The queue status cache interval is resolved from the session
    /// configuration.
    pub fn new(
        session: Arc<Session>,
        name: impl Into<String>,
        commands: Arc<dyn GridCommands>,
    ) -> Result<Self> {
        let name = name.into();
        let stat_interval = session
            .config()
            .queue_stat_interval(Some(&name), DEFAULT_QUEUE_STAT_INTERVAL)?;
        let queue_status = Arc::new(QueueStatusCache::new(
            commands.clone(),
            None,
            stat_interval,
        ));
        Ok(Self {
            session,
            name,
            commands,
            queue_status,
        })
    }
}

impl Executor for GridExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    fn submit(&self, task: TaskRun) -> BoxFuture<'_, Result<()>> {
        async move {
            let TaskBody::Shell(script) = &task.body else {
                return Err(GridflowError::SubmitError(format!(
                    "grid executor '{}' can only run shell tasks",
                    self.name
                )));
            };
            BashWrapperBuilder::new(&task.work_dir, script.as_str())
                .build()
                .await?;

            let exit_read_timeout = self
                .session
                .config()
                .exit_read_timeout(Some(&self.name), DEFAULT_EXIT_READ_TIMEOUT)?;

            let handler = GridTaskHandler::new(
                task,
                self.commands.clone(),
                self.queue_status.clone(),
                exit_read_timeout,
            );

            let monitor = self
                .session
                .monitor_for(&self.name, DEFAULT_GRID_QUEUE_SIZE, DEFAULT_GRID_POLL_INTERVAL)
                .await?;
            monitor.schedule(Box::new(handler)).await
        }
        .boxed()
    }
}
