// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use toml::value::Table;

use crate::config::duration::duration_value;
use crate::errors::{GridflowError, Result};

/// Session-level configuration as read from a TOML file.
///
/// The `executor` key drives the two-level resolution used by monitors and
/// executors:
///
/// ```toml
/// [executor]
/// queue_size = 321
/// poll_interval = "1s"
///
/// [executor."$sge"]
/// queue_size = 789
/// ```
///
/// Top-level keys under `[executor]` apply to every executor; a
/// `$<name>`-prefixed subtable overrides them for that executor only.
/// `executor` may also be a bare string naming the executor to use, in
/// which case no settings are carried and every lookup falls back to the
/// caller-supplied default.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SessionConfig {
    #[serde(default)]
    pub executor: ExecutorSetting,

    /// Base directory for task work folders.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

/// The `executor` key: a bare name or a settings table.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ExecutorSetting {
    /// `executor = "sge"` — names the executor, carries no settings.
    Name(String),
    /// `[executor]` table, optionally with `$<name>`-scoped subtables.
    Scopes(Table),
}

impl Default for ExecutorSetting {
    fn default() -> Self {
        ExecutorSetting::Scopes(Table::new())
    }
}

impl SessionConfig {
    /// The executor name selected by a bare-string `executor` key, if any.
    pub fn executor_name(&self) -> Option<&str> {
        match &self.executor {
            ExecutorSetting::Name(name) => Some(name),
            ExecutorSetting::Scopes(_) => None,
        }
    }

    /// Two-level lookup: `executor."$<name>".<key>` first, then the
    /// executor-global `executor.<key>`, else `None`.
    fn executor_value(&self, executor: Option<&str>, key: &str) -> Option<&toml::Value> {
        let ExecutorSetting::Scopes(table) = &self.executor else {
            return None;
        };

        if let Some(name) = executor {
            let scope_key = format!("${}", name);
            if let Some(toml::Value::Table(scope)) = table.get(&scope_key) {
                if let Some(value) = scope.get(key) {
                    return Some(value);
                }
            }
        }

        // Executor-global default; scoped subtables are not settings.
        match table.get(key) {
            Some(value) if !value.is_table() => Some(value),
            _ => None,
        }
    }

    /// Capacity of the named executor's monitor queue.
    pub fn queue_size(&self, executor: Option<&str>, default: usize) -> Result<usize> {
        match self.executor_value(executor, "queue_size") {
            None => Ok(default),
            Some(toml::Value::Integer(n)) if *n > 0 => Ok(*n as usize),
            Some(other) => Err(GridflowError::ConfigError(format!(
                "executor queue_size must be a positive integer, got {}",
                other
            ))),
        }
    }

    /// How long the monitor sleeps between poll passes.
    pub fn poll_interval(&self, executor: Option<&str>, default: Duration) -> Result<Duration> {
        self.duration_setting(executor, "poll_interval", default)
    }

    /// How often a grid executor refreshes its queue status snapshot.
    pub fn queue_stat_interval(
        &self,
        executor: Option<&str>,
        default: Duration,
    ) -> Result<Duration> {
        self.duration_setting(executor, "queue_stat_interval", default)
    }

    /// How often the monitor logs a diagnostic snapshot of its queue.
    pub fn dump_interval(&self, executor: Option<&str>, default: Duration) -> Result<Duration> {
        self.duration_setting(executor, "dump_interval", default)
    }

    /// How long a grid handler waits on an unreadable exit file before it
    /// completes the task with a synthetic error status.
    pub fn exit_read_timeout(
        &self,
        executor: Option<&str>,
        default: Duration,
    ) -> Result<Duration> {
        self.duration_setting(executor, "exit_read_timeout", default)
    }

    fn duration_setting(
        &self,
        executor: Option<&str>,
        key: &str,
        default: Duration,
    ) -> Result<Duration> {
        match self.executor_value(executor, key) {
            None => Ok(default),
            Some(value) => duration_value(value)
                .map_err(|e| GridflowError::ConfigError(format!("executor {}: {}", key, e))),
        }
    }
}
