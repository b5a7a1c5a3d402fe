// src/lib.rs

//! Task execution subsystem for a workflow engine.
//!
//! The upstream dataflow engine hands a [`task::TaskRun`] to an
//! [`executor::Executor`]; the executor creates a
//! [`handler::TaskHandler`] and admits it into the executor's
//! [`monitor::TaskPollingMonitor`], which polls it to completion and
//! emits a [`monitor::MonitorEvent`] back to the dispatcher.

pub mod config;
pub mod errors;
pub mod executor;
pub mod handler;
pub mod logging;
pub mod monitor;
pub mod session;
pub mod task;
pub mod wrapper;
