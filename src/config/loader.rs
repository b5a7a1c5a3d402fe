// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::SessionConfig;
use crate::errors::Result;

/// Load a session configuration file from a given path.
///
/// Leading `~` in the path is expanded using the `HOME` environment
/// variable, so user configs like `~/.gridflow/config.toml` work as
/// expected.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<SessionConfig> {
    let path = expand_home(path.as_ref());
    let contents = fs::read_to_string(path)?;
    load_from_str(&contents)
}

/// Parse a session configuration from TOML text.
pub fn load_from_str(contents: &str) -> Result<SessionConfig> {
    let config: SessionConfig = toml::from_str(contents)?;
    Ok(config)
}

/// Helper to resolve a default config path.
///
/// Currently this just returns `gridflow.toml` in the current working
/// directory; front-ends are free to look elsewhere before falling back
/// to this.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("gridflow.toml")
}

/// Expand a leading `~` or `~/...` using `HOME`.
///
/// Paths without a leading tilde, and environments without `HOME`, are
/// returned unchanged.
pub fn expand_home(path: &Path) -> PathBuf {
    let Some(s) = path.to_str() else {
        return path.to_path_buf();
    };
    let Ok(home) = std::env::var("HOME") else {
        return path.to_path_buf();
    };

    if s == "~" {
        PathBuf::from(home)
    } else if let Some(rest) = s.strip_prefix("~/") {
        PathBuf::from(home).join(rest)
    } else {
        path.to_path_buf()
    }
}
