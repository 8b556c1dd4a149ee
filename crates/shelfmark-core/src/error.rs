//! Error type for calls that can be rejected.
//!
//! Only malformed input rejects a call. Unreachable language models and
//! catalogs are absorbed by fallbacks or recorded as failed sync attempts,
//! and validation failures are returned as data. Storage errors bubble up
//! untouched so the caller can surface them as internal failures.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShelfError {
    /// Missing or malformed request fields. No work was performed.
    #[error("{0}")]
    Input(String),

    /// The backing store failed to read or persist.
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl ShelfError {
    pub fn input(message: impl Into<String>) -> Self {
        ShelfError::Input(message.into())
    }

    pub fn is_input(&self) -> bool {
        matches!(self, ShelfError::Input(_))
    }
}

pub type ShelfResult<T> = std::result::Result<T, ShelfError>;
