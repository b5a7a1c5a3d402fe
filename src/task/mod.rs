// src/task/mod.rs

//! Task identity, execution artifacts and per-task configuration.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::config::parse_duration;
use crate::errors::{GridflowError, Result};

/// Canonical task name type used throughout the engine.
pub type TaskName = String;

/// File name of the wrapper script inside a task work directory.
pub const WRAPPER_FILE_NAME: &str = ".command.sh";
/// File name of the combined stdout+stderr capture.
pub const OUTPUT_FILE_NAME: &str = ".command.out";
/// File name of the exit-code sentinel, written atomically by the wrapper.
pub const EXIT_FILE_NAME: &str = ".command.exitcode";

/// A deferred native computation, run on the shared blocking pool.
///
/// Normal returns become the task's stdout value; errors (and panics) are
/// captured as the task's error.
pub type NativeCode = Box<dyn FnOnce() -> anyhow::Result<String> + Send + Sync + 'static>;

/// What a task executes: a shell script or a native closure.
pub enum TaskBody {
    /// Shell script text, executed through the wrapper script.
    Shell(String),
    /// Deferred native computation; consumed when the handler submits it.
    Native(Option<NativeCode>),
}

impl fmt::Debug for TaskBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskBody::Shell(script) => f.debug_tuple("Shell").field(script).finish(),
            TaskBody::Native(code) => f
                .debug_tuple("Native")
                .field(&code.as_ref().map(|_| "<code>"))
                .finish(),
        }
    }
}

/// Where a completed task's output lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutput {
    /// Path to the captured stdout+stderr file (shell tasks).
    File(PathBuf),
    /// In-memory value returned by a native task.
    Value(String),
}

/// A single unit of work handed to an executor.
///
/// Created by the upstream dataflow engine, mutated only by its owning
/// handler (`exit_status`, `stdout`, `error`), and handed back to the
/// dispatcher in the completion event.
#[derive(Debug)]
pub struct TaskRun {
    pub name: TaskName,
    /// Work directory; created by the caller before submission.
    pub work_dir: PathBuf,
    pub body: TaskBody,
    /// Optional bytes piped to the process' stdin.
    pub stdin: Option<Vec<u8>>,
    pub config: TaskConfig,

    /// Exit status, set at completion. For native tasks that fail, this
    /// stays unset and `error` is set instead.
    pub exit_status: Option<i32>,
    /// Captured output, set at completion.
    pub stdout: Option<TaskOutput>,
    /// Captured failure of a native task.
    pub error: Option<anyhow::Error>,
}

impl TaskRun {
    /// Create a shell task.
    pub fn shell(
        name: impl Into<TaskName>,
        work_dir: impl Into<PathBuf>,
        script: impl Into<String>,
    ) -> Self {
        Self::new(name, work_dir, TaskBody::Shell(script.into()))
    }

    /// Create a native task from a deferred computation.
    pub fn native(
        name: impl Into<TaskName>,
        work_dir: impl Into<PathBuf>,
        code: impl FnOnce() -> anyhow::Result<String> + Send + Sync + 'static,
    ) -> Self {
        Self::new(name, work_dir, TaskBody::Native(Some(Box::new(code))))
    }

    pub fn new(name: impl Into<TaskName>, work_dir: impl Into<PathBuf>, body: TaskBody) -> Self {
        Self {
            name: name.into(),
            work_dir: work_dir.into(),
            body,
            stdin: None,
            config: TaskConfig::default(),
            exit_status: None,
            stdout: None,
            error: None,
        }
    }

    pub fn with_config(mut self, config: TaskConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_stdin(mut self, stdin: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    /// Path of the wrapper script for this task.
    pub fn wrapper_file(&self) -> PathBuf {
        self.work_dir.join(WRAPPER_FILE_NAME)
    }

    /// Path of the combined output capture for this task.
    pub fn output_file(&self) -> PathBuf {
        self.work_dir.join(OUTPUT_FILE_NAME)
    }

    /// Path of the exit-code sentinel for this task.
    pub fn exit_file(&self) -> PathBuf {
        self.work_dir.join(EXIT_FILE_NAME)
    }

    pub fn is_native(&self) -> bool {
        matches!(self.body, TaskBody::Native(_))
    }

    /// Take the native closure out of the task; `None` for shell tasks or
    /// if the code was already consumed.
    pub fn take_native_code(&mut self) -> Option<NativeCode> {
        match &mut self.body {
            TaskBody::Native(code) => code.take(),
            TaskBody::Shell(_) => None,
        }
    }

    /// Task name with runs of non-alphanumerics collapsed to `_`, suitable
    /// for backend job names. Honours the `name` config override.
    pub fn sanitized_name(&self) -> String {
        let name = self.config.name.as_deref().unwrap_or(&self.name);
        let mut out = String::with_capacity(name.len());
        let mut last_was_replacement = false;
        for c in name.chars() {
            if c.is_ascii_alphanumeric() {
                out.push(c);
                last_was_replacement = false;
            } else if !last_was_replacement {
                out.push('_');
                last_was_replacement = true;
            }
        }
        out
    }
}

fn default_shell() -> Vec<String> {
    vec!["bash".to_string()]
}

/// Per-task execution options.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Backend queue to submit to (grid executors only).
    #[serde(default)]
    pub queue: Option<String>,

    /// Memory limit, e.g. `"2GB"`.
    #[serde(default)]
    pub max_memory: Option<String>,

    /// Wall-time limit, e.g. `"3h"`.
    #[serde(default)]
    pub max_duration: Option<String>,

    /// Free-form extra submit options, split on whitespace.
    #[serde(default)]
    pub cluster_options: Option<String>,

    /// Command used to interpret the wrapper script.
    #[serde(default = "default_shell")]
    pub shell: Vec<String>,

    /// Display name override, used when deriving backend job names.
    #[serde(default)]
    pub name: Option<String>,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            queue: None,
            max_memory: None,
            max_duration: None,
            cluster_options: None,
            shell: default_shell(),
            name: None,
        }
    }
}

impl TaskConfig {
    /// Parsed `max_duration`, if configured.
    pub fn effective_max_duration(&self) -> Result<Option<Duration>> {
        match &self.max_duration {
            None => Ok(None),
            Some(s) => parse_duration(s).map(Some).map_err(|e| {
                GridflowError::ConfigError(format!("task max_duration: {}", e))
            }),
        }
    }
}
