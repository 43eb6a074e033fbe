//! Reconciler error types.

use std::time::Duration;

use scaleset_provider::ProviderError;
use thiserror::Error;

/// Errors that end a single reconciliation pass.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("provider {operation} did not finish within {timeout:?}")]
    ProviderTimeout {
        operation: &'static str,
        timeout: Duration,
    },
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;
