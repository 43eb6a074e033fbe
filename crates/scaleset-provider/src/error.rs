//! Provider error types.

use thiserror::Error;

/// Errors surfaced by inventory provider calls.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("instance not found: {0}")]
    InstanceNotFound(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;
