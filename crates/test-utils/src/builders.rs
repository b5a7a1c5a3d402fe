#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use gridflow::config::{load_from_str, SessionConfig};
use gridflow::monitor::MonitorEvent;
use gridflow::session::Session;
use gridflow::task::{TaskConfig, TaskRun};

/// Builder for `TaskRun` to simplify test setup.
pub struct TaskRunBuilder {
    name: String,
    work_dir: PathBuf,
    script: String,
    stdin: Option<Vec<u8>>,
    config: TaskConfig,
}

impl TaskRunBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            work_dir: PathBuf::from("."),
            script: "true".to_string(),
            stdin: None,
            config: TaskConfig::default(),
        }
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn script(mut self, script: &str) -> Self {
        self.script = script.to_string();
        self
    }

    pub fn stdin(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(bytes.into());
        self
    }

    pub fn queue(mut self, queue: &str) -> Self {
        self.config.queue = Some(queue.to_string());
        self
    }

    pub fn max_memory(mut self, memory: &str) -> Self {
        self.config.max_memory = Some(memory.to_string());
        self
    }

    pub fn max_duration(mut self, duration: &str) -> Self {
        self.config.max_duration = Some(duration.to_string());
        self
    }

    pub fn cluster_options(mut self, options: &str) -> Self {
        self.config.cluster_options = Some(options.to_string());
        self
    }

    pub fn build(self) -> TaskRun {
        let mut task = TaskRun::shell(self.name, self.work_dir, self.script)
            .with_config(self.config);
        task.stdin = self.stdin;
        task
    }
}

/// Parse a session config from TOML, panicking on errors.
pub fn session_config(toml: &str) -> SessionConfig {
    load_from_str(toml).expect("Failed to parse session config in test")
}

/// Build a session around the given config TOML, returning the receiver
/// for its completion events.
pub fn test_session(
    toml: &str,
    work_base: impl Into<PathBuf>,
) -> (Arc<Session>, mpsc::Receiver<MonitorEvent>) {
    let (events_tx, events_rx) = mpsc::channel(64);
    let session = Arc::new(Session::new(session_config(toml), work_base, events_tx));
    (session, events_rx)
}
