//! Store error taxonomy.
//!
//! Every variant carries the operation label it surfaced from and wraps the
//! underlying cause where one exists, so callers can walk the chain.
//! [`EventStoreError::kind`] gives the coarse classification an RPC
//! front-end maps onto its status codes.

use palisade_core::ValidationError;
use thiserror::Error;

use crate::config::ConfigError;

/// Coarse error classification for wire mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller must fix the input; never retry.
    InvalidArgument,
    /// Concurrency conflict (DCB violation or serialization failure); the
    /// caller re-projects, re-decides, retries.
    Aborted,
    /// Connectivity, timeout, pool exhaustion, structural mismatch.
    Unavailable,
    /// Projection semaphore exhausted; retry after backoff.
    ResourceExhausted,
    /// Unclassified database or internal failure.
    Internal,
}

/// Mismatch between the expected events table shape and what the database
/// actually has. Fatal at store construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "table {table_name}: column {column_name}: {issue} (expected {expected_type}, actual {actual_type})"
)]
pub struct TableStructureError {
    /// Table that was inspected.
    pub table_name: String,
    /// Offending column ("" when the whole table is missing).
    pub column_name: String,
    /// Expected SQL type.
    pub expected_type: String,
    /// Type actually found ("" when absent).
    pub actual_type: String,
    /// What went wrong ("table not found", "missing column", "unexpected type").
    pub issue: String,
}

/// Errors surfaced by the event store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// Pre-flight structural check failed.
    #[error("{operation}: {source}")]
    Validation {
        /// Operation label (e.g., "Append").
        operation: &'static str,
        /// The violated contract.
        #[source]
        source: ValidationError,
    },

    /// The append condition matched an event: the caller's decision is stale.
    #[error("{operation}: append condition violated: {detail}")]
    ConditionViolated {
        /// Operation label.
        operation: &'static str,
        /// What matched.
        detail: String,
    },

    /// SERIALIZABLE rollback or deadlock; distinct from a DCB violation and
    /// safe to retry automatically.
    #[error("{operation}: serialization conflict, retry the transaction")]
    SerializationConflict {
        /// Operation label.
        operation: &'static str,
        /// Underlying database error (SQLSTATE 40001/40P01).
        #[source]
        source: sqlx::Error,
    },

    /// Connectivity, timeout, or pool trouble.
    #[error("{operation}: {reason}")]
    Resource {
        /// Operation label.
        operation: &'static str,
        /// What was unavailable.
        reason: String,
        /// Underlying cause, when the driver produced one.
        #[source]
        source: Option<sqlx::Error>,
    },

    /// Projection semaphore exhausted. Fail-fast: the store never queues.
    #[error("too many concurrent projections: max {max_concurrent}, current {current_count}")]
    TooManyProjections {
        /// Configured permit count.
        max_concurrent: usize,
        /// Active projections at rejection time.
        current_count: usize,
    },

    /// Events table shape does not match the contract.
    #[error(transparent)]
    TableStructure(#[from] TableStructureError),

    /// Invalid store configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A persisted row failed to decode.
    #[error("{operation}: corrupt row: {detail}")]
    Decode {
        /// Operation label.
        operation: &'static str,
        /// What failed to decode.
        detail: String,
    },

    /// Everything else from the database, cause attached.
    #[error("{operation}: database error")]
    Database {
        /// Operation label.
        operation: &'static str,
        /// Underlying driver error.
        #[source]
        source: sqlx::Error,
    },
}

impl EventStoreError {
    /// Wire-mapping classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } | Self::Config(_) => ErrorKind::InvalidArgument,
            Self::ConditionViolated { .. } | Self::SerializationConflict { .. } => {
                ErrorKind::Aborted
            }
            Self::Resource { .. } | Self::TableStructure(_) => ErrorKind::Unavailable,
            Self::TooManyProjections { .. } => ErrorKind::ResourceExhausted,
            Self::Decode { .. } | Self::Database { .. } => ErrorKind::Internal,
        }
    }

    /// True for failures a client may retry (with backoff) without changing
    /// the request. DCB violations are NOT retriable as-is: the caller must
    /// re-project first.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::SerializationConflict { .. }
                | Self::Resource { .. }
                | Self::TooManyProjections { .. }
        )
    }

    /// Is this a DCB violation?
    pub fn is_condition_violation(&self) -> bool {
        matches!(self, Self::ConditionViolated { .. })
    }

    /// Resource-shaped error for operations on a closed store.
    pub(crate) fn closed(operation: &'static str) -> Self {
        Self::Resource { operation, reason: "store is closed".to_string(), source: None }
    }

    /// Resource-shaped error for a timed-out operation.
    pub(crate) fn timeout(operation: &'static str, millis: u128) -> Self {
        Self::Resource {
            operation,
            reason: format!("timed out after {}ms", millis),
            source: None,
        }
    }

    /// Classify a driver error: serialization failures and deadlocks are
    /// retriable conflicts, lock and connectivity trouble is
    /// resource-shaped, everything else stays generic.
    pub(crate) fn from_sqlx(operation: &'static str, err: sqlx::Error) -> Self {
        let sqlstate = match &err {
            sqlx::Error::Database(db) => db.code().map(|code| code.into_owned()),
            _ => None,
        };

        match sqlstate.as_deref() {
            Some("40001") | Some("40P01") => {
                return Self::SerializationConflict { operation, source: err };
            }
            Some("55P03") => {
                return Self::Resource {
                    operation,
                    reason: "advisory lock acquisition timed out".to_string(),
                    source: Some(err),
                };
            }
            _ => {}
        }

        match err {
            sqlx::Error::PoolTimedOut => Self::Resource {
                operation,
                reason: "connection pool timed out".to_string(),
                source: Some(sqlx::Error::PoolTimedOut),
            },
            sqlx::Error::PoolClosed => Self::Resource {
                operation,
                reason: "connection pool closed".to_string(),
                source: Some(sqlx::Error::PoolClosed),
            },
            err @ sqlx::Error::Io(_) => Self::Resource {
                operation,
                reason: "connection failure".to_string(),
                source: Some(err),
            },
            err => Self::Database { operation, source: err },
        }
    }
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;

// =============================================================================
// Tests
// =============================================================================
