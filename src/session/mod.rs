// src/session/mod.rs

//! Session state shared by executors and monitors.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use crate::config::SessionConfig;
use crate::errors::Result;
use crate::monitor::{MonitorEvent, TaskPollingMonitor};

/// One workflow session: configuration, the work-folder base, and the
/// per-executor monitor registry.
///
/// Completion events from every monitor flow to the dispatcher over the
/// channel supplied at construction.
pub struct Session {
    config: SessionConfig,
    work_base: PathBuf,
    events_tx: mpsc::Sender<MonitorEvent>,
    monitors: tokio::sync::Mutex<HashMap<String, Arc<TaskPollingMonitor>>>,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        work_base: impl Into<PathBuf>,
        events_tx: mpsc::Sender<MonitorEvent>,
    ) -> Self {
        Self {
            config,
            work_base: work_base.into(),
            events_tx,
            monitors: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn work_base(&self) -> &PathBuf {
        &self.work_base
    }

    /// Work directory for a task, keyed by its content fingerprint:
    /// `<work_base>/<first-2-hex>/<rest>`.
    ///
    /// The fingerprint itself is computed by the upstream hashing
    /// collaborator.
    pub fn work_dir_for(&self, hash: &str) -> PathBuf {
        if hash.len() > 2 {
            self.work_base.join(&hash[..2]).join(&hash[2..])
        } else {
            self.work_base.join(hash)
        }
    }

    /// The monitor for the named executor, creating it (and starting its
    /// poll loop) on first use. Monitors are created once per executor per
    /// session.
    pub async fn monitor_for(
        &self,
        executor: &str,
        default_queue_size: usize,
        default_poll_interval: Duration,
    ) -> Result<Arc<TaskPollingMonitor>> {
        let mut monitors = self.monitors.lock().await;
        if let Some(monitor) = monitors.get(executor) {
            return Ok(monitor.clone());
        }

        let monitor = Arc::new(TaskPollingMonitor::spawn(
            &self.config,
            executor,
            default_queue_size,
            default_poll_interval,
            self.events_tx.clone(),
        )?);
        monitors.insert(executor.to_string(), monitor.clone());
        debug!(executor, "monitor created for session");
        Ok(monitor)
    }

    /// Shut down every monitor of this session. Idempotent.
    pub async fn shutdown(&self) {
        let monitors: Vec<_> = self.monitors.lock().await.values().cloned().collect();
        for monitor in monitors {
            monitor.shutdown().await;
        }
    }
}
