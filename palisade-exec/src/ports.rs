//! Executor port definitions.
//!
//! Ports define the interfaces the executor orchestrates over. The store
//! port is implemented by the real `EventStore`; the stub in
//! [`crate::stub`] implements both for tests.

use async_trait::async_trait;
use palisade_core::{AppendCondition, Command, Cursor, InputEvent, LockKey};
use palisade_store::{EventStore, EventStoreError};

use crate::error::Result;

/// Port for user command handlers.
///
/// A handler turns a command into the events that record its effect. It
/// typically projects current state first (deriving the append condition
/// the caller passes alongside), then decides.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Produce the events for `command`. An empty result is treated as a
    /// programmer bug by the executor.
    async fn handle(&self, command: &Command) -> Result<Vec<InputEvent>>;
}

/// Port for the append surface of the event store.
#[async_trait]
pub trait AppendPort: Send + Sync {
    /// Unconditional batch append.
    async fn append(&self, events: &[InputEvent]) -> std::result::Result<Cursor, EventStoreError>;

    /// Conditional batch append.
    async fn append_if(
        &self,
        events: &[InputEvent],
        condition: &AppendCondition,
    ) -> std::result::Result<Cursor, EventStoreError>;

    /// Append under an explicit advisory-lock list.
    async fn append_with_locks(
        &self,
        events: &[InputEvent],
        locks: &[LockKey],
        condition: Option<&AppendCondition>,
    ) -> std::result::Result<Cursor, EventStoreError>;
}

#[async_trait]
impl AppendPort for EventStore {
    async fn append(&self, events: &[InputEvent]) -> std::result::Result<Cursor, EventStoreError> {
        EventStore::append(self, events).await
    }

    async fn append_if(
        &self,
        events: &[InputEvent],
        condition: &AppendCondition,
    ) -> std::result::Result<Cursor, EventStoreError> {
        EventStore::append_if(self, events, condition).await
    }

    async fn append_with_locks(
        &self,
        events: &[InputEvent],
        locks: &[LockKey],
        condition: Option<&AppendCondition>,
    ) -> std::result::Result<Cursor, EventStoreError> {
        EventStore::append_with_locks(self, events, locks, condition).await
    }
}
