//! Error types for bhumi-mesh

use thiserror::Error;

/// Navmesh error type
#[derive(Error, Debug)]
pub enum NavmeshError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Snapshot version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u8, found: u8 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Worker thread error: {0}")]
    Worker(String),
}

impl From<toml::de::Error> for NavmeshError {
    fn from(e: toml::de::Error) -> Self {
        NavmeshError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NavmeshError>;
