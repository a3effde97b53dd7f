//! Error taxonomy for the persistence boundary.
//!
//! Nothing here is fatal to the process: `NotFound` on a parent reference is
//! downgraded to "no parent" by the editing session, `Network` failures are
//! retried only by the user reopening the session, and `Validation` keeps the
//! session open for correction.

use thiserror::Error;

/// Errors surfaced by a [`crate::store::TaskStore`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The referenced task (or other record) no longer exists.
    #[error("not found: {0}")]
    NotFound(String),

    /// Transient transport or backend failure. Not auto-retried.
    #[error("network error: {0}")]
    Network(String),

    /// The payload was rejected at the persistence boundary.
    /// Surfaced to the user as a save failure; the session stays open.
    #[error("validation failed: {0}")]
    Validation(String),
}

impl StoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        StoreError::NotFound(what.into())
    }

    pub fn network(err: impl std::fmt::Display) -> Self {
        StoreError::Network(err.to_string())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        StoreError::Validation(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

// The db layer uses anyhow internally; backend failures crossing the store
// boundary count as transient unless they carry a more specific StoreError.
impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<StoreError>() {
            Ok(store_err) => store_err,
            Err(err) => StoreError::network(err),
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
