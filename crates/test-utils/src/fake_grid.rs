use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use gridflow::errors::{GridflowError, Result};
use gridflow::executor::{GridCommands, QueueStatus};
use gridflow::task::TaskRun;

/// A grid backend whose commands are plain `bash`/`true` invocations, so
/// grid handlers can be exercised end-to-end without a real scheduler.
///
/// - submit echoes a fixed job id, which `parse_job_id` extracts,
/// - the queue status command is `true`; `parse_queue_status` ignores its
///   output and returns whatever the test scripted into [`statuses`],
/// - kill is `true` as well.
///
/// [`statuses`]: FakeGridCommands::statuses
pub struct FakeGridCommands {
    pub job_id: String,
    pub statuses: Arc<Mutex<HashMap<String, QueueStatus>>>,
}

impl FakeGridCommands {
    pub fn new(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            statuses: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Script the queue to report `job_id` in the given state.
    pub fn set_status(&self, job_id: &str, status: QueueStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(job_id.to_string(), status);
    }

    /// Script the queue to no longer list `job_id`.
    pub fn clear_status(&self, job_id: &str) {
        self.statuses.lock().unwrap().remove(job_id);
    }
}

impl GridCommands for FakeGridCommands {
    fn submit_command_line(&self, _task: &TaskRun, _wrapper: &Path) -> Result<Vec<String>> {
        Ok(vec![
            "bash".to_string(),
            "-c".to_string(),
            format!("echo {}", self.job_id),
        ])
    }

    fn parse_job_id(&self, output: &str) -> Result<String> {
        output
            .split_whitespace()
            .filter(|token| !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()))
            .last()
            .map(str::to_string)
            .ok_or_else(|| {
                GridflowError::ParseError(format!("no job id in submit output: {:?}", output))
            })
    }

    fn kill_command(&self, _job_id: &str) -> Vec<String> {
        vec!["true".to_string()]
    }

    fn queue_status_command(&self, _queue: Option<&str>) -> Vec<String> {
        vec!["true".to_string()]
    }

    fn parse_queue_status(&self, _output: &str) -> HashMap<String, QueueStatus> {
        self.statuses.lock().unwrap().clone()
    }
}
