//! Error types for MargaNav

use bhumi_mesh::NavmeshError;
use thiserror::Error;

/// MargaNav error type
#[derive(Error, Debug)]
pub enum MargaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Navmesh error: {0}")]
    Mesh(#[from] NavmeshError),

    #[error("Invalid snapshot: {0}")]
    Snapshot(String),

    #[error("Thread error: {0}")]
    Thread(String),
}

impl From<toml::de::Error> for MargaError {
    fn from(e: toml::de::Error) -> Self {
        MargaError::Config(e.to_string())
    }
}

impl From<std::io::Error> for MargaError {
    fn from(e: std::io::Error) -> Self {
        MargaError::Mesh(NavmeshError::Io(e))
    }
}

pub type Result<T> = std::result::Result<T, MargaError>;
