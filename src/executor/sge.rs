// src/executor/sge.rs

//! Command shaping and response parsing for Sun Grid Engine.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::errors::{GridflowError, Result};
use crate::executor::grid::{GridCommands, QueueStatus};
use crate::task::TaskRun;

/// SGE backend: `qsub` / `qdel` / `qstat`.
pub struct SgeCommands;

impl GridCommands for SgeCommands {
    /// Shape the `qsub` command line. Options with no configured source
    /// value are omitted; `cluster_options` tokens are inserted verbatim
    /// before the wrapper file name.
    fn submit_command_line(&self, task: &TaskRun, wrapper: &Path) -> Result<Vec<String>> {
        let config = &task.config;
        let mut argv: Vec<String> = vec![
            "qsub".into(),
            "-wd".into(),
            task.work_dir.display().to_string(),
            "-N".into(),
            format!("nf-{}", task.sanitized_name()),
            "-o".into(),
            "/dev/null".into(),
            "-j".into(),
            "y".into(),
            "-terse".into(),
            "-V".into(),
        ];

        if let Some(queue) = &config.queue {
            argv.push("-q".into());
            argv.push(queue.clone());
        }

        if let Some(duration) = config.effective_max_duration()? {
            argv.push("-l".into());
            argv.push(format!("h_rt={}", format_clock(duration)));
        }

        if let Some(memory) = &config.max_memory {
            argv.push("-l".into());
            argv.push(format!("virtual_free={}", strip_memory_suffix(memory)));
        }

        if let Some(options) = &config.cluster_options {
            argv.extend(options.split_whitespace().map(str::to_string));
        }

        let wrapper_name = wrapper
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| wrapper.display().to_string());
        argv.push(wrapper_name);

        Ok(argv)
    }

    /// With `-terse` the job id is printed on its own line, but submit
    /// output may carry preamble; the id is the last all-digit token on
    /// any line.
    fn parse_job_id(&self, output: &str) -> Result<String> {
        let mut job_id = None;
        for line in output.lines() {
            for token in line.split_whitespace() {
                if !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()) {
                    job_id = Some(token);
                }
            }
        }
        job_id.map(str::to_string).ok_or_else(|| {
            GridflowError::ParseError(format!("no job id found in submit output: {:?}", output))
        })
    }

    fn kill_command(&self, job_id: &str) -> Vec<String> {
        vec!["qdel".into(), "-j".into(), job_id.to_string()]
    }

    fn queue_status_command(&self, queue: Option<&str>) -> Vec<String> {
        match queue {
            None => vec!["qstat".into()],
            Some(queue) => vec!["qstat".into(), "-q".into(), queue.to_string()],
        }
    }

    /// Skip the header (everything up to and including the dashed
    /// separator line), then map the 5th field of each row to a status.
    fn parse_queue_status(&self, output: &str) -> HashMap<String, QueueStatus> {
        let mut statuses = HashMap::new();
        let mut past_header = false;

        for line in output.lines() {
            if !past_header {
                let trimmed = line.trim();
                if !trimmed.is_empty() && trimmed.chars().all(|c| c == '-') {
                    past_header = true;
                }
                continue;
            }

            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 5 {
                debug!(line, "skipping malformed qstat line");
                continue;
            }

            statuses.insert(fields[0].to_string(), parse_state_code(fields[4]));
        }

        statuses
    }
}

fn parse_state_code(code: &str) -> QueueStatus {
    match code {
        "r" | "t" | "s" | "R" => QueueStatus::Running,
        "qw" => QueueStatus::Pending,
        "hqw" | "hRwq" => QueueStatus::Hold,
        c if c.starts_with('E') => QueueStatus::Error,
        _ => QueueStatus::Unknown,
    }
}

/// Render a duration as zero-padded `HH:MM:SS` for `-l h_rt`.
fn format_clock(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// `"2GB"` → `"2G"`: the unit letter is preserved, a trailing `B` is
/// stripped.
fn strip_memory_suffix(memory: &str) -> String {
    let trimmed = memory.trim();
    trimmed
        .strip_suffix('B')
        .or_else(|| trimmed.strip_suffix('b'))
        .unwrap_or(trimmed)
        .to_string()
}
