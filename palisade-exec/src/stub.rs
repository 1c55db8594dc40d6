//! Stub implementations of the executor ports, for tests.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use palisade_core::{AppendCondition, Command, Cursor, InputEvent, LockKey};
use palisade_store::EventStoreError;

use crate::error::Result;
use crate::ports::{AppendPort, CommandHandler};

/// Handler returning a fixed event list regardless of the command.
pub struct StubHandler {
    events: Vec<InputEvent>,
}

impl StubHandler {
    /// Create a stub producing `events` on every invocation.
    pub fn new(events: Vec<InputEvent>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl CommandHandler for StubHandler {
    async fn handle(&self, _command: &Command) -> Result<Vec<InputEvent>> {
        Ok(self.events.clone())
    }
}

/// In-memory append port recording every call.
///
/// Each append gets a fresh transaction id, mimicking the real store's
/// one-transaction-per-batch behavior.
#[derive(Default)]
pub struct StubStore {
    appended: Mutex<Vec<Vec<InputEvent>>>,
    conditions: Mutex<Vec<Option<AppendCondition>>>,
    locks: Mutex<Vec<Vec<LockKey>>>,
    next_txid: AtomicI64,
    next_position: AtomicI64,
    fail_condition: bool,
}

impl StubStore {
    /// Create an empty stub store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every conditional append fail with a DCB violation.
    pub fn with_condition_violation(mut self) -> Self {
        self.fail_condition = true;
        self
    }

    /// Batches appended so far.
    pub fn appended(&self) -> Vec<Vec<InputEvent>> {
        self.appended.lock().expect("stub poisoned").clone()
    }

    /// Conditions seen so far (None for unconditional appends).
    pub fn conditions(&self) -> Vec<Option<AppendCondition>> {
        self.conditions.lock().expect("stub poisoned").clone()
    }

    /// Explicit lock lists seen so far.
    pub fn locks(&self) -> Vec<Vec<LockKey>> {
        self.locks.lock().expect("stub poisoned").clone()
    }

    fn record(
        &self,
        events: &[InputEvent],
        condition: Option<&AppendCondition>,
    ) -> std::result::Result<Cursor, EventStoreError> {
        let txid = self.next_txid.fetch_add(1, Ordering::SeqCst) + 1;
        let position = self.next_position.fetch_add(events.len() as i64, Ordering::SeqCst)
            + events.len() as i64;

        self.appended.lock().expect("stub poisoned").push(events.to_vec());
        self.conditions.lock().expect("stub poisoned").push(condition.cloned());

        Ok(Cursor::new(txid, position))
    }
}

#[async_trait]
impl AppendPort for StubStore {
    async fn append(
        &self,
        events: &[InputEvent],
    ) -> std::result::Result<Cursor, EventStoreError> {
        self.record(events, None)
    }

    async fn append_if(
        &self,
        events: &[InputEvent],
        condition: &AppendCondition,
    ) -> std::result::Result<Cursor, EventStoreError> {
        if self.fail_condition {
            return Err(EventStoreError::ConditionViolated {
                operation: "AppendIf",
                detail: "stubbed conflict".to_string(),
            });
        }
        self.record(events, Some(condition))
    }

    async fn append_with_locks(
        &self,
        events: &[InputEvent],
        locks: &[LockKey],
        condition: Option<&AppendCondition>,
    ) -> std::result::Result<Cursor, EventStoreError> {
        if self.fail_condition && condition.is_some() {
            return Err(EventStoreError::ConditionViolated {
                operation: "AppendWithLocks",
                detail: "stubbed conflict".to_string(),
            });
        }
        self.locks.lock().expect("stub poisoned").push(locks.to_vec());
        self.record(events, condition)
    }
}
