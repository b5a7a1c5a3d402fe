// src/handler/mod.rs

//! Per-task lifecycle handlers.
//!
//! A handler drives one task through NEW → SUBMITTED → RUNNING → COMPLETED
//! on one backend. Transitions are monotonic and COMPLETED is absorbing.
//! The monitor owns the handler after admission and is the only caller of
//! the check methods; `submit` runs on the producer side while the queue
//! slot is held.
//!
//! Concrete handlers:
//! - [`local::LocalTaskHandler`] — forked child process on this machine.
//! - [`native::NativeTaskHandler`] — closure on the shared blocking pool.
//! - [`grid::GridTaskHandler`] — job submitted to an external scheduler.

use futures::future::BoxFuture;

use crate::errors::Result;
use crate::task::TaskRun;

pub mod grid;
pub mod local;
pub mod native;

pub use grid::GridTaskHandler;
pub use local::LocalTaskHandler;
pub use native::NativeTaskHandler;

/// Exit status recorded when a handler is failed without the backend
/// reporting a real code (poll errors, shutdown abandonment, unreadable
/// grid exit files).
pub const UNKNOWN_EXIT_STATUS: i32 = i32::MAX;

/// Exit status recorded when a task is killed for exceeding its
/// `max_duration` and the OS reports nothing better (SIGTERM convention).
pub const TIMEOUT_EXIT_STATUS: i32 = 143;

/// Lifecycle state of a task handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerStatus {
    New,
    Submitted,
    Running,
    Completed,
}

/// Driver for one task's lifecycle on one executor.
///
/// The check methods are expected to be cheap and non-blocking: they
/// observe backend state (a child's `try_wait`, a shared queue snapshot, a
/// sentinel file) rather than waiting on it. `kill` is idempotent and safe
/// in any state at or past SUBMITTED.
pub trait TaskHandler: Send {
    fn task(&self) -> &TaskRun;

    fn status(&self) -> HandlerStatus;

    /// Begin execution; on success the handler is SUBMITTED. May write
    /// files under the task work directory.
    fn submit(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Returns true (and moves SUBMITTED → RUNNING) once the underlying
    /// execution has been observed to be active. Idempotent once RUNNING.
    fn check_if_running(&mut self) -> BoxFuture<'_, Result<bool>>;

    /// Returns true (and moves RUNNING → COMPLETED) when the backend
    /// reports termination or a timeout is enforced. On the transition the
    /// task's `exit_status` and `stdout` (or `error`) are populated and
    /// backend resources released.
    fn check_if_completed(&mut self) -> BoxFuture<'_, Result<bool>>;

    /// Force-terminate the underlying execution. Idempotent, non-blocking,
    /// safe to call on COMPLETED handlers.
    fn kill(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Force the handler into COMPLETED with an error status; used by the
    /// monitor when a check fails or shutdown abandons the task.
    fn fail(&mut self, error: anyhow::Error);

    /// Hand the finished task back for the completion event.
    fn into_task(self: Box<Self>) -> TaskRun;
}
