//! Credential Store Errors
//!
//! Error types for store operations.

use crate::crypto::CipherError;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the credential store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Uniqueness constraint violated
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// Stored credential could not be sealed or opened
    #[error("Credential error: {0}")]
    Cipher(#[from] CipherError),

    /// Row holds a value that cannot be mapped
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Check if this error is a uniqueness conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::Conflict(db_err.message().to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}
