//! Errors surfaced by storage backends.

use thiserror::Error;

use crate::types::SessionId;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend could not be reached or refused the write. Callers treat this
    /// as transient.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
