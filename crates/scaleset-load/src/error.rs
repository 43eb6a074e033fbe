//! Load tracker error types.

use scaleset_core::{InstanceId, SessionId};
use thiserror::Error;

/// Errors returned by session and instance operations on the tracker.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("no instance is accepting sessions below capacity {capacity}")]
    InsufficientCapacity { capacity: u32 },

    #[error("unknown session: {0}")]
    UnknownSession(SessionId),

    #[error("unknown instance: {0}")]
    UnknownInstance(InstanceId),

    #[error("instance {instance} still has {load} session(s) bound")]
    InvariantViolation { instance: InstanceId, load: u32 },
}

pub type LoadResult<T> = Result<T, LoadError>;
