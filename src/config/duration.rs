// src/config/duration.rs

//! Human-readable duration parsing and formatting.
//!
//! Configuration values such as `poll_interval = "50ms"` or
//! `max_duration = "3h"` use the `<int><unit>` shape with unit one of
//! `ms`, `s`/`sec`, `m`/`min`, `h`, `d`. Settings that accept a duration
//! also accept a bare integer, interpreted as milliseconds.

use std::time::Duration;

use crate::errors::{GridflowError, Result};

const MILLIS_PER_SEC: u128 = 1_000;
const MILLIS_PER_MIN: u128 = 60 * MILLIS_PER_SEC;
const MILLIS_PER_HOUR: u128 = 60 * MILLIS_PER_MIN;
const MILLIS_PER_DAY: u128 = 24 * MILLIS_PER_HOUR;

/// Parse a duration string like `"250ms"`, `"3s"`, `"5 min"`, `"3h"`, `"1d"`.
///
/// Whitespace around the number and the unit is tolerated.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(GridflowError::ConfigError(
            "empty duration string".to_string(),
        ));
    }

    // Find the boundary between digits and suffix.
    let idx = s.chars().position(|c| !c.is_ascii_digit()).ok_or_else(|| {
        GridflowError::ConfigError(format!("duration '{}' is missing a unit suffix", s))
    })?;
    if idx == 0 {
        return Err(GridflowError::ConfigError(format!(
            "duration '{}' does not start with a number",
            s
        )));
    }

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part.parse().map_err(|e| {
        GridflowError::ConfigError(format!("invalid duration number '{}': {}", num_part, e))
    })?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" | "sec" => Ok(Duration::from_secs(value)),
        "m" | "min" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        "d" => Ok(Duration::from_secs(value * 60 * 60 * 24)),
        _ => Err(GridflowError::ConfigError(format!(
            "unsupported duration unit '{}'; expected ms, s, m, h or d",
            unit
        ))),
    }
}

/// Format a duration using the largest unit that represents it exactly.
///
/// The output always round-trips through [`parse_duration`] to the same
/// number of milliseconds. Sub-millisecond precision is discarded.
pub fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms == 0 {
        return "0ms".to_string();
    }
    if ms % MILLIS_PER_DAY == 0 {
        format!("{}d", ms / MILLIS_PER_DAY)
    } else if ms % MILLIS_PER_HOUR == 0 {
        format!("{}h", ms / MILLIS_PER_HOUR)
    } else if ms % MILLIS_PER_MIN == 0 {
        format!("{}m", ms / MILLIS_PER_MIN)
    } else if ms % MILLIS_PER_SEC == 0 {
        format!("{}s", ms / MILLIS_PER_SEC)
    } else {
        format!("{}ms", ms)
    }
}

/// Coerce a TOML value into a duration.
///
/// Strings go through [`parse_duration`]; integers are millisecond counts.
pub fn duration_value(value: &toml::Value) -> Result<Duration> {
    match value {
        toml::Value::Integer(n) if *n >= 0 => Ok(Duration::from_millis(*n as u64)),
        toml::Value::Integer(n) => Err(GridflowError::ConfigError(format!(
            "negative duration: {}",
            n
        ))),
        toml::Value::String(s) => parse_duration(s),
        other => Err(GridflowError::ConfigError(format!(
            "expected a duration string or integer millisecond count, got {}",
            other.type_str()
        ))),
    }
}
