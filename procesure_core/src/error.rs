//! Error types for Procesure

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Procesure operations
#[derive(Error, Debug)]
pub enum ProcesureError {
    #[error("Failed to update {}: {source}", path.display())]
    ConfigUpdate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command '{program}' failed with exit code {code}: {stderr}")]
    Command {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Key parsing error: {0}")]
    KeyParsing(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Required binary not found: {}", .0.display())]
    MissingBinary(PathBuf),

    #[error("Supervisor error: {0}")]
    Supervisor(String),
}

impl ProcesureError {
    /// Wrap an I/O error raised while rewriting a config file
    pub fn config_update(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ConfigUpdate {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProcesureError>;
