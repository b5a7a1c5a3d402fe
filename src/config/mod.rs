// src/config/mod.rs

//! Session configuration: loading, the executor-scoped settings tree, and
//! human-readable durations.

pub mod duration;
pub mod loader;
pub mod model;

pub use duration::{format_duration, parse_duration};
pub use loader::{default_config_path, load_from_path, load_from_str};
pub use model::{ExecutorSetting, SessionConfig};
