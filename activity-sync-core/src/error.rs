//! Store error types.

use std::fmt;

use thiserror::Error;

use crate::remote::RemoteError;

/// Why a mutation was refused before reaching the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// `create` was called for an id the registry already holds.
    AlreadyExists,
    /// Another mutation for the same id has not resolved yet.
    InFlight,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::AlreadyExists => write!(f, "record already exists"),
            ConflictKind::InFlight => write!(f, "a change is already being saved"),
        }
    }
}

/// Errors returned by store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Conflict on {id}: {kind}")]
    Conflict { id: String, kind: ConflictKind },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

impl StoreError {
    pub(crate) fn conflict(id: &str, kind: ConflictKind) -> Self {
        StoreError::Conflict {
            id: id.to_string(),
            kind,
        }
    }

    /// Conflicts are local programming or UI errors, not something to show
    /// the user as a failed save.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

impl From<RemoteError> for StoreError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::NotFound(id) => StoreError::NotFound(id),
            other => StoreError::Transport(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
