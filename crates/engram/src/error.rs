//! Error types for Engram

use thiserror::Error;

/// Main error type for Engram operations
#[derive(Error, Debug)]
pub enum EngramError {
    /// Memory content missing or whitespace-only
    #[error("Memory content must not be empty")]
    EmptyContent,

    /// Character or memory id not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Embedding engine not ready or failed to load
    #[error("Embedding engine unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Storage-related errors (LanceDB, buffer files, snapshot)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Request shape/type mismatch
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for Engram operations
pub type Result<T> = std::result::Result<T, EngramError>;
