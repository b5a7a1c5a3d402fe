// src/wrapper/mod.rs

//! Wrapper script generation for shell tasks.
//!
//! Executors materialize a `.command.sh` in the task work directory before
//! submitting. The wrapper:
//! - runs the staging prologue (copy or symlink declared inputs),
//! - runs the user script in a subshell with combined output redirected to
//!   `.command.out`,
//! - writes the script's exit code atomically to `.command.exitcode`
//!   (temp file + rename),
//! - runs the unstaging epilogue (move declared outputs to the collection
//!   area),
//! - exits with the user script's code.
//!
//! Handlers treat `.command.exitcode` as the authoritative completion
//! signal: the file being present means the task finished, and its content
//! is the exit code.

use std::path::PathBuf;

use tracing::debug;

use crate::errors::Result;
use crate::task::{EXIT_FILE_NAME, OUTPUT_FILE_NAME, WRAPPER_FILE_NAME};

/// How a declared input is staged into the work directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageMode {
    Copy,
    Symlink,
}

/// A declared input file, staged under `name` inside the work directory.
#[derive(Debug, Clone)]
pub struct StagedInput {
    pub source: PathBuf,
    pub name: String,
    pub mode: StageMode,
}

/// Builder for the task wrapper script.
#[derive(Debug, Clone)]
pub struct BashWrapperBuilder {
    work_dir: PathBuf,
    script: String,
    inputs: Vec<StagedInput>,
    outputs: Vec<String>,
    collect_dir: Option<PathBuf>,
}

impl BashWrapperBuilder {
    pub fn new(work_dir: impl Into<PathBuf>, script: impl Into<String>) -> Self {
        Self {
            work_dir: work_dir.into(),
            script: script.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            collect_dir: None,
        }
    }

    /// Stage `source` into the work directory as `name` by symlink.
    pub fn stage_symlink(mut self, source: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        self.inputs.push(StagedInput {
            source: source.into(),
            name: name.into(),
            mode: StageMode::Symlink,
        });
        self
    }

    /// Stage `source` into the work directory as `name` by copy.
    pub fn stage_copy(mut self, source: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        self.inputs.push(StagedInput {
            source: source.into(),
            name: name.into(),
            mode: StageMode::Copy,
        });
        self
    }

    /// Declare an output file to be moved to the collection area.
    pub fn unstage_output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(name.into());
        self
    }

    /// Directory the declared outputs are moved into after the script runs.
    pub fn collect_into(mut self, dir: impl Into<PathBuf>) -> Self {
        self.collect_dir = Some(dir.into());
        self
    }

    /// Render the wrapper script text.
    ///
    /// All paths inside the script are relative to the work directory; the
    /// wrapper is always executed with the work directory as CWD (local
    /// handler `current_dir`, grid `-wd`).
    pub fn render(&self) -> String {
        let mut script = String::new();
        script.push_str("#!/bin/bash\n");
        script.push_str("# task wrapper generated by gridflow\n");

        if !self.inputs.is_empty() {
            script.push_str("# stage task inputs\n");
            for input in &self.inputs {
                match input.mode {
                    StageMode::Symlink => script.push_str(&format!(
                        "ln -sf '{}' '{}'\n",
                        input.source.display(),
                        input.name
                    )),
                    StageMode::Copy => script.push_str(&format!(
                        "cp -r '{}' '{}'\n",
                        input.source.display(),
                        input.name
                    )),
                }
            }
        }

        script.push_str("\n(\n");
        script.push_str(&self.script);
        if !self.script.ends_with('\n') {
            script.push('\n');
        }
        script.push_str(&format!(") > \"{}\" 2>&1\n", OUTPUT_FILE_NAME));
        script.push_str("task_ret=$?\n\n");

        script.push_str(&format!(
            "printf '%s' \"$task_ret\" > \"{exit}.tmp\"\nmv \"{exit}.tmp\" \"{exit}\"\n",
            exit = EXIT_FILE_NAME
        ));

        if let (Some(collect), false) = (&self.collect_dir, self.outputs.is_empty()) {
            script.push_str("\n# collect task outputs\n");
            script.push_str(&format!("mkdir -p '{}'\n", collect.display()));
            for output in &self.outputs {
                script.push_str(&format!("mv -f '{}' '{}/'\n", output, collect.display()));
            }
        }

        script.push_str("\nexit $task_ret\n");
        script
    }

    /// Write the wrapper script into the work directory and return its path.
    pub async fn build(&self) -> Result<PathBuf> {
        let path = self.work_dir.join(WRAPPER_FILE_NAME);
        tokio::fs::write(&path, self.render()).await?;

        #[cfg(unix)]
        {
            use std::fs::Permissions;
            use std::os::unix::fs::PermissionsExt;

            tokio::fs::set_permissions(&path, Permissions::from_mode(0o744)).await?;
        }

        debug!(path = %path.display(), "wrapper script written");
        Ok(path)
    }
}
