//! Error types for the digital twin memory service

use thiserror::Error;

/// Result type alias for memory and conversation operations
pub type Result<T> = std::result::Result<T, TwinError>;

#[derive(Error, Debug)]
pub enum TwinError {

    // =============================
    // Memory Layer Errors
    // =============================

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Store operation timed out: {0}")]
    Timeout(String),

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    // =============================
    // Conversation Errors
    // =============================

    #[error("Generation error: {0}")]
    GenerationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),
}
