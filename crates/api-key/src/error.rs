//! Error types for API key operations.

use thiserror::Error;

/// Errors that can occur during API key operations.
#[derive(Debug, Error)]
pub enum ApiKeyError {
    /// Presented key doesn't parse (missing/duplicated delimiter, empty or
    /// non-printable part).
    #[error("Malformed API key")]
    MalformedKey,

    /// Generated prefix already exists in the store.
    #[error("Duplicate key prefix")]
    DuplicatePrefix,

    /// No record for the requested prefix.
    #[error("API key not found")]
    NotFound,

    /// The single failure returned to unauthenticated callers.
    #[error("Unauthorized")]
    Unauthorized,

    /// The OS random source could not be read.
    #[error("Secure random source unavailable")]
    EntropySourceUnavailable,

    /// The password hashing backend refused to produce a digest.
    #[error("Hashing failed: {0}")]
    Hashing(String),

    /// The persistence collaborator failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration values are out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for API key operations.
pub type Result<T> = std::result::Result<T, ApiKeyError>;
