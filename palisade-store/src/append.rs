//! Transactional batch append with dynamic consistency boundaries.
//!
//! One transaction per append: set isolation, acquire advisory locks in
//! canonical order, run the single condition probe against the
//! transaction's own snapshot, insert the batch, commit. Either all rows
//! of a batch become visible or none.

use palisade_core::{
    validate_batch, validate_query, AppendCondition, Cursor, InputEvent, LockKey,
};
use sqlx::{Postgres, QueryBuilder, Row, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::error::{EventStoreError, Result};
use crate::store::{with_timeout, EventStore};
use crate::{codec, locks, sql};

impl EventStore {
    /// Append a batch unconditionally.
    ///
    /// Returns the `(transaction_id, position)` cursor of the last event in
    /// the batch. Positions within the batch are strictly increasing in
    /// submission order and all rows share one transaction id.
    pub async fn append(&self, events: &[InputEvent]) -> Result<Cursor> {
        self.append_inner("Append", events, None, None).await
    }

    /// Append a batch unless `condition` matches any stored event.
    ///
    /// # Errors
    /// Returns a concurrency error (message contains `"append condition
    /// violated"`) when an event matching the condition's query exists
    /// after its cursor - the caller's decision is stale and must be
    /// recomputed.
    pub async fn append_if(
        &self,
        events: &[InputEvent],
        condition: &AppendCondition,
    ) -> Result<Cursor> {
        self.append_inner("AppendIf", events, Some(condition), None).await
    }

    /// Append under an explicit advisory-lock list instead of lock tags.
    ///
    /// The supplied keys are sorted to the canonical acquisition order.
    /// Used by the command executor's explicit-locks surface.
    pub async fn append_with_locks(
        &self,
        events: &[InputEvent],
        locks: &[LockKey],
        condition: Option<&AppendCondition>,
    ) -> Result<Cursor> {
        self.append_inner("AppendWithLocks", events, condition, Some(locks)).await
    }

    async fn append_inner(
        &self,
        operation: &'static str,
        events: &[InputEvent],
        condition: Option<&AppendCondition>,
        explicit_locks: Option<&[LockKey]>,
    ) -> Result<Cursor> {
        self.ensure_open(operation)?;

        validate_batch(events, self.config().max_batch_size)
            .map_err(|source| EventStoreError::Validation { operation, source })?;
        if let Some(condition) = condition {
            validate_query(&condition.query)
                .map_err(|source| EventStoreError::Validation { operation, source })?;
        }

        with_timeout(
            operation,
            self.config().append_timeout,
            self.run_append(operation, events, condition, explicit_locks),
        )
        .await
    }

    async fn run_append(
        &self,
        operation: &'static str,
        events: &[InputEvent],
        condition: Option<&AppendCondition>,
        explicit_locks: Option<&[LockKey]>,
    ) -> Result<Cursor> {
        let config = self.config();

        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| EventStoreError::from_sqlx(operation, e))?;

        sqlx::query(&format!(
            "SET TRANSACTION ISOLATION LEVEL {}",
            config.append_isolation.as_sql()
        ))
        .execute(&mut *tx)
        .await
        .map_err(|e| EventStoreError::from_sqlx(operation, e))?;

        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            config.lock_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await
        .map_err(|e| EventStoreError::from_sqlx(operation, e))?;

        let lock_keys = match explicit_locks {
            Some(keys) => locks::sort_keys(keys),
            None => locks::batch_lock_keys(events),
        };
        locks::acquire(&mut tx, &lock_keys)
            .await
            .map_err(|e| EventStoreError::from_sqlx(operation, e))?;

        if let Some(condition) = condition {
            check_condition(&mut tx, &config.events_table, condition, operation).await?;
        }

        let last = insert_batch(&mut tx, &config.events_table, events, operation).await?;

        // SERIALIZABLE conflicts surface at commit; from_sqlx maps 40001
        // to the retriable conflict error.
        tx.commit().await.map_err(|e| EventStoreError::from_sqlx(operation, e))?;

        debug!(
            count = events.len(),
            transaction_id = last.transaction_id,
            last_position = last.position,
            locks = lock_keys.len(),
            operation,
            "Batch appended"
        );

        Ok(last)
    }
}

/// Run the condition's existence probe inside the append transaction.
///
/// A single `SELECT 1 ... LIMIT 1` against the transaction's own snapshot:
/// under REPEATABLE READ / SERIALIZABLE this is the same consistent view
/// the insert commits against.
async fn check_condition(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
    condition: &AppendCondition,
    operation: &'static str,
) -> Result<()> {
    // Nil query: unconditional.
    if condition.query.is_empty() {
        return Ok(());
    }

    let compiled = sql::compile_exists(table, condition);
    let args = sql::bind_arguments(&compiled.binds)
        .map_err(|e| EventStoreError::from_sqlx(operation, e))?;

    let hit: Option<i32> = sqlx::query_scalar_with(&compiled.sql, args)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| EventStoreError::from_sqlx(operation, e))?;

    if hit.is_some() {
        let after = condition
            .after
            .map(|c| c.to_string())
            .unwrap_or_else(|| "start of stream".to_string());
        return Err(EventStoreError::ConditionViolated {
            operation,
            detail: format!("matching event exists after cursor {}", after),
        });
    }

    Ok(())
}

/// Insert the batch in one multi-row statement, returning the cursor of the
/// last row. Lock tags are stripped; tags persist in canonical sorted form.
async fn insert_batch(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
    events: &[InputEvent],
    operation: &'static str,
) -> Result<Cursor> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "INSERT INTO {} (id, type, tags, data) ",
        table
    ));
    builder.push_values(events, |mut row, event| {
        row.push_bind(Uuid::now_v7())
            .push_bind(&event.event_type)
            .push_bind(codec::encode_tags(&event.persisted_tags()))
            .push_bind(&event.data);
    });
    builder.push(" RETURNING transaction_id, position");

    let rows = builder
        .build()
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| EventStoreError::from_sqlx(operation, e))?;

    let last = rows.last().ok_or_else(|| EventStoreError::Decode {
        operation,
        detail: "insert returned no rows".to_string(),
    })?;

    let transaction_id: i64 = last
        .try_get("transaction_id")
        .map_err(|e| EventStoreError::from_sqlx(operation, e))?;
    let position: i64 = last
        .try_get("position")
        .map_err(|e| EventStoreError::from_sqlx(operation, e))?;

    Ok(Cursor::new(transaction_id, position))
}
