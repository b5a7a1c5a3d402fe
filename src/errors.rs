// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GridflowError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Submit failed: {0}")]
    SubmitError(String),

    #[error("Command execution error: {0}")]
    ExecError(String),

    #[error("Failed to parse backend response: {0}")]
    ParseError(String),

    #[error("Timed out: {0}")]
    TimeoutError(String),

    #[error("Monitor is shut down; task admission rejected")]
    ShutdownError,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, GridflowError>;
