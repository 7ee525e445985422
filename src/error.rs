//! Error types for the state store.

use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Type mismatch at {path}: {message}")]
    TypeMismatch { path: String, message: String },

    #[error("Store already registered: {0}")]
    StoreExists(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl StoreError {
    pub(crate) fn type_mismatch(path: impl ToString, message: impl Into<String>) -> Self {
        StoreError::TypeMismatch {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
