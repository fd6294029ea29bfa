use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Flowlens operations
#[derive(Error, Debug)]
pub enum FlowlensError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Project manifest error: {0}")]
    Manifest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Graph validation failed: {0}")]
    Validation(String),

    #[error("Graph inconsistency: {0}")]
    GraphInconsistency(String),
}

pub type Result<T> = std::result::Result<T, FlowlensError>;
