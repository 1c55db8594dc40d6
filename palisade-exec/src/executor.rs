//! Command executor: handler orchestration over the append engine.
//!
//! The executor is a thin coordinator: validate the command, run the
//! handler, validate its output, forward to the store. Consistency comes
//! from the append condition and lock list the caller supplies - the
//! executor adds no hidden concurrency control of its own.

use std::sync::Arc;

use palisade_core::{
    validate_command, AppendCondition, Command, Cursor, InputEvent, LockKey, ValidationError,
};
use tracing::{debug, info};

use crate::error::{ExecError, Result};
use crate::ports::{AppendPort, CommandHandler};

/// What a successful command execution produced.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    /// The events the handler generated, as appended (lock tags intact on
    /// the input side; the store strips them from what persists).
    pub events: Vec<InputEvent>,
    /// Cursor of the last appended event.
    pub cursor: Cursor,
}

/// Executes commands against an append port.
pub struct CommandExecutor<A: AppendPort> {
    store: Arc<A>,
}

impl<A: AppendPort> CommandExecutor<A> {
    /// Create an executor over a store.
    pub fn new(store: Arc<A>) -> Self {
        Self { store }
    }

    /// Run `handler` on `command` and append its events, optionally under a
    /// consistency boundary.
    ///
    /// Returns the produced events and the append cursor so callers and
    /// tests can assert on them.
    pub async fn execute_command(
        &self,
        command: &Command,
        handler: &dyn CommandHandler,
        condition: Option<&AppendCondition>,
    ) -> Result<CommandOutcome> {
        const OP: &str = "ExecuteCommand";

        let events = self.run_handler(OP, command, handler).await?;

        let cursor = match condition {
            Some(condition) => self.store.append_if(&events, condition).await?,
            None => self.store.append(&events).await?,
        };

        info!(
            command_type = %command.command_type,
            count = events.len(),
            cursor = %cursor,
            "Command executed"
        );

        Ok(CommandOutcome { events, cursor })
    }

    /// Like [`execute_command`](Self::execute_command), but serializes on an
    /// explicit advisory-lock list instead of lock tags.
    ///
    /// `locks` must be non-empty, and the handler's events must not carry
    /// `lock:`-prefixed tags - with this surface, lock keys come from the
    /// supplied list only.
    pub async fn execute_command_with_locks(
        &self,
        command: &Command,
        handler: &dyn CommandHandler,
        locks: &[LockKey],
        condition: Option<&AppendCondition>,
    ) -> Result<CommandOutcome> {
        const OP: &str = "ExecuteCommandWithLocks";

        if locks.is_empty() {
            return Err(ExecError::Validation {
                operation: OP,
                source: ValidationError::new("locks", "0", "empty lock list"),
            });
        }

        let events = self.run_handler(OP, command, handler).await?;

        if events.iter().any(InputEvent::has_lock_tags) {
            return Err(ExecError::LockTagsNotAllowed);
        }

        let cursor = self.store.append_with_locks(&events, locks, condition).await?;

        info!(
            command_type = %command.command_type,
            count = events.len(),
            locks = locks.len(),
            cursor = %cursor,
            "Command executed under explicit locks"
        );

        Ok(CommandOutcome { events, cursor })
    }

    async fn run_handler(
        &self,
        operation: &'static str,
        command: &Command,
        handler: &dyn CommandHandler,
    ) -> Result<Vec<InputEvent>> {
        validate_command(command)
            .map_err(|source| ExecError::Validation { operation, source })?;

        debug!(command_type = %command.command_type, operation, "Running command handler");

        let events = handler.handle(command).await?;

        // A command that records nothing is a programmer bug, not a no-op.
        if events.is_empty() {
            return Err(ExecError::Validation {
                operation,
                source: ValidationError::new("events", "0", "command handler returned no events"),
            });
        }

        Ok(events)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::{StubHandler, StubStore};
    use palisade_core::{Query, Tag};
    use serde_json::json;

    fn registered(username: &str) -> InputEvent {
        InputEvent::new(
            "AccountRegistered",
            vec![Tag::new("username", username)],
            json!({"username": username}),
        )
    }

    fn create_test_executor() -> (CommandExecutor<StubStore>, Arc<StubStore>) {
        let store = Arc::new(StubStore::new());
        (CommandExecutor::new(Arc::clone(&store)), store)
    }

    #[tokio::test]
    async fn test_execute_command_appends_handler_events() {
        let (executor, store) = create_test_executor();
        let handler = StubHandler::new(vec![registered("alice")]);
        let command = Command::new("RegisterAccount", json!({"username": "alice"}));

        let outcome = executor.execute_command(&command, &handler, None).await.unwrap();

        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].event_type, "AccountRegistered");
        assert_eq!(store.appended().len(), 1);
    }

    #[tokio::test]
    async fn test_execute_command_forwards_condition() {
        let (executor, store) = create_test_executor();
        let handler = StubHandler::new(vec![registered("alice")]);
        let command = Command::new("RegisterAccount", json!({}));
        let condition = AppendCondition::fail_if_exists(Query::single(
            vec!["AccountRegistered"],
            vec![Tag::new("username", "alice")],
        ));

        executor.execute_command(&command, &handler, Some(&condition)).await.unwrap();

        assert_eq!(store.conditions().len(), 1);
        assert_eq!(store.conditions()[0], Some(condition));
    }

    #[tokio::test]
    async fn test_execute_command_surfaces_condition_violation() {
        let (executor, _) = {
            let store = Arc::new(StubStore::new().with_condition_violation());
            (CommandExecutor::new(Arc::clone(&store)), store)
        };
        let handler = StubHandler::new(vec![registered("alice")]);
        let command = Command::new("RegisterAccount", json!({}));
        let condition = AppendCondition::fail_if_exists(Query::all());

        let err =
            executor.execute_command(&command, &handler, Some(&condition)).await.unwrap_err();

        assert!(err.is_condition_violation());
        assert!(err.to_string().contains("append condition violated"));
    }

    #[tokio::test]
    async fn test_rejects_empty_command_type() {
        let (executor, _) = create_test_executor();
        let handler = StubHandler::new(vec![registered("alice")]);
        let command = Command::new("", json!({}));

        let err = executor.execute_command(&command, &handler, None).await.unwrap_err();
        assert!(matches!(err, ExecError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_rejects_empty_handler_output() {
        let (executor, store) = create_test_executor();
        let handler = StubHandler::new(vec![]);
        let command = Command::new("RegisterAccount", json!({}));

        let err = executor.execute_command(&command, &handler, None).await.unwrap_err();

        match err {
            ExecError::Validation { source, .. } => {
                assert_eq!(source.field, "events");
                assert!(source.message.contains("no events"));
            }
            other => panic!("expected Validation, got {:?}", other),
        }
        assert!(store.appended().is_empty());
    }

    #[tokio::test]
    async fn test_with_locks_requires_lock_list() {
        let (executor, _) = create_test_executor();
        let handler = StubHandler::new(vec![registered("alice")]);
        let command = Command::new("RegisterAccount", json!({}));

        let err = executor
            .execute_command_with_locks(&command, &handler, &[], None)
            .await
            .unwrap_err();

        match err {
            ExecError::Validation { source, .. } => assert_eq!(source.field, "locks"),
            other => panic!("expected Validation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_with_locks_rejects_lock_tags() {
        let (executor, store) = create_test_executor();
        let tagged = InputEvent::new(
            "ResourceUsageUpdated",
            vec![Tag::new("resource", "R"), Tag::new("lock:resource", "R")],
            json!({}),
        );
        let handler = StubHandler::new(vec![tagged]);
        let command = Command::new("UpdateUsage", json!({}));

        let err = executor
            .execute_command_with_locks(&command, &handler, &[LockKey::new("resource:R")], None)
            .await
            .unwrap_err();

        assert!(err
            .to_string()
            .contains("lock tags are not allowed when using ExecuteCommandWithLocks"));
        assert!(store.appended().is_empty());
    }

    #[tokio::test]
    async fn test_with_locks_passes_lock_list_through() {
        let (executor, store) = create_test_executor();
        let handler = StubHandler::new(vec![registered("alice")]);
        let command = Command::new("RegisterAccount", json!({}));
        let locks = vec![LockKey::new("resource:R"), LockKey::new("account:alice")];

        executor
            .execute_command_with_locks(&command, &handler, &locks, None)
            .await
            .unwrap();

        assert_eq!(store.locks().len(), 1);
        assert_eq!(store.locks()[0], locks);
    }
}
