// src/executor/mod.rs

//! Execution backends.
//!
//! An executor knows how to turn a [`TaskRun`](crate::task::TaskRun) into a
//! running piece of work: it materializes the wrapper script for shell
//! tasks, creates the right handler and hands it to its monitor (obtained
//! from the session, one per executor name). The monitor does the rest.
//!
//! - [`local::LocalExecutor`] — child processes and native closures on
//!   this machine.
//! - [`grid::GridExecutor`] — jobs on an external scheduler, described by
//!   a [`grid::GridCommands`] implementation such as [`sge::SgeCommands`].

use futures::future::BoxFuture;

use crate::errors::Result;
use crate::task::TaskRun;

pub mod grid;
pub mod local;
pub mod sge;

pub use grid::{GridCommands, GridExecutor, QueueStatus, QueueStatusCache};
pub use local::LocalExecutor;
pub use sge::SgeCommands;

/// A backend capable of executing tasks.
pub trait Executor: Send + Sync {
    fn name(&self) -> &str;

    /// Materialize per-task files and hand the task to this executor's
    /// monitor. Blocks while the monitor queue is full; a submit refusal
    /// is propagated to the caller.
    fn submit(&self, task: TaskRun) -> BoxFuture<'_, Result<()>>;
}
