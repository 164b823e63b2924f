//! Error types shared across the pipeline crates

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, TercError>;

/// Shared error type
#[derive(Error, Debug)]
pub enum TercError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid reporting period: {0}")]
    InvalidPeriod(String),

    #[error("Invalid load window: {start} is after {end}")]
    InvalidWindow { start: String, end: String },

    #[error("Unknown layer: {0}")]
    UnknownLayer(String),

    #[error("Unknown file kind: {0}")]
    UnknownFileKind(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}
