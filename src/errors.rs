// src/errors.rs

//! Crate-wide error type and result alias.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipedagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cycle detected in task graph: {0}")]
    Cycle(String),

    #[error("task '{task}': path '{path}' does not match pattern '{pattern}'")]
    PatternMismatch {
        task: String,
        path: String,
        pattern: String,
    },

    #[error("task '{task}': declared input file missing: {path:?}")]
    MissingInput { task: String, path: PathBuf },

    #[error("task '{task}': command exited with code {code}")]
    Execution { task: String, code: i32 },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PipedagError>;
