// src/logging.rs

//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! The embedding front-end decides the level: an explicit argument wins,
//! then the `GRIDFLOW_LOG` environment variable, then `info`. Output goes
//! to stderr, keeping stdout free for task output.

use anyhow::Result;
use tracing_subscriber::fmt;

/// Initialise the global logging subscriber. Call once at startup.
pub fn init_logging(level: Option<tracing::Level>) -> Result<()> {
    let level = level
        .or_else(|| {
            std::env::var("GRIDFLOW_LOG")
                .ok()
                .and_then(|s| parse_level(&s))
        })
        .unwrap_or(tracing::Level::INFO);

    fmt()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

fn parse_level(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}
