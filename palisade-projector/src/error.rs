//! Projection errors.

use palisade_store::EventStoreError;
use thiserror::Error;

/// Errors surfaced by the projection engine.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// A projector failed structural validation before any DB work.
    #[error("invalid projector: {detail}")]
    InvalidProjector {
        /// Which contract was violated (names the offending field).
        detail: String,
    },

    /// A user-supplied transition function panicked. The panic is trapped
    /// and localized to the projector and event that triggered it.
    #[error("projector {projector_id} panicked at position {position} ({event_type}): {message}")]
    TransitionPanicked {
        /// Projector whose transition panicked.
        projector_id: String,
        /// Position of the event being applied.
        position: i64,
        /// Type of the event being applied.
        event_type: String,
        /// Panic payload, stringified.
        message: String,
    },

    /// The projection was cancelled before the stream completed.
    #[error("projection cancelled")]
    Cancelled,

    /// Underlying store failure (including the fail-fast
    /// too-many-projections rejection).
    #[error(transparent)]
    Store(#[from] EventStoreError),
}

impl ProjectionError {
    /// Is this the fail-fast semaphore rejection?
    pub fn is_too_many_projections(&self) -> bool {
        matches!(self, Self::Store(EventStoreError::TooManyProjections { .. }))
    }
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
