//! Executor error types.

use palisade_core::ValidationError;
use palisade_store::EventStoreError;
use thiserror::Error;

/// Errors that can occur while executing a command.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Pre-flight validation failed (command shape, empty handler output,
    /// empty lock list).
    #[error("{operation}: {source}")]
    Validation {
        /// Operation label.
        operation: &'static str,
        /// The violated contract.
        #[source]
        source: ValidationError,
    },

    /// The explicit-locks surface received events carrying lock tags.
    /// Lock keys come from the supplied list there; tags would silently
    /// take different locks than the caller asked for.
    #[error("lock tags are not allowed when using ExecuteCommandWithLocks")]
    LockTagsNotAllowed,

    /// The user handler failed.
    #[error("handler error: {0}")]
    Handler(String),

    /// Store failure, DCB violations included.
    #[error(transparent)]
    Store(#[from] EventStoreError),
}

impl ExecError {
    /// Is this a DCB violation from the append?
    pub fn is_condition_violation(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_condition_violation())
    }
}

/// Result type for executor operations.
pub type Result<T> = std::result::Result<T, ExecError>;
