//! Buffered and streaming reads.
//!
//! Both surfaces compile through the same SQL compiler and decode through
//! the same codec, so ordering is always `(transaction_id, position)`
//! ascending. The streaming variant pushes rows through a bounded channel;
//! the producer blocks on a full buffer and observes cancellation between
//! sends, so a cancel propagates within one buffer's worth of events.

use futures::StreamExt;
use palisade_core::{validate_query, Cursor, Event, Query};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::codec::EventRow;
use crate::error::{EventStoreError, Result};
use crate::sql::{self, CompiledQuery};
use crate::store::{with_timeout, EventStore};

impl EventStore {
    /// Read all events matching `query` after `after`, buffered.
    pub async fn query(&self, query: &Query, after: Option<Cursor>) -> Result<Vec<Event>> {
        const OP: &str = "Query";
        self.ensure_open(OP)?;
        validate_query(query)
            .map_err(|source| EventStoreError::Validation { operation: OP, source })?;

        let compiled = sql::compile_select(&self.config().events_table, query, after);
        let args = sql::bind_arguments(&compiled.binds)
            .map_err(|e| EventStoreError::from_sqlx(OP, e))?;

        let rows: Vec<EventRow> = with_timeout(OP, self.config().query_timeout, async {
            sqlx::query_as_with::<_, EventRow, _>(&compiled.sql, args)
                .fetch_all(self.pool())
                .await
                .map_err(|e| EventStoreError::from_sqlx(OP, e))
        })
        .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            events.push(row.into_event(OP)?);
        }

        debug!(count = events.len(), "Query returned events");
        Ok(events)
    }

    /// Read events matching `query` after `after` as a bounded stream.
    ///
    /// The producer stops on end-of-rows, the first read error, or
    /// cancellation; in every case the channel closes. Dropping the
    /// returned stream cancels the producer.
    pub async fn query_stream(
        &self,
        query: &Query,
        after: Option<Cursor>,
    ) -> Result<EventStream> {
        const OP: &str = "QueryStream";
        self.ensure_open(OP)?;
        validate_query(query)
            .map_err(|source| EventStoreError::Validation { operation: OP, source })?;

        let compiled = sql::compile_select(&self.config().events_table, query, after);
        let (sender, receiver) = mpsc::channel(self.config().stream_buffer);
        let cancel = CancellationToken::new();

        let store = self.clone();
        let producer_cancel = cancel.clone();
        tokio::spawn(async move {
            produce(store, compiled, sender, producer_cancel).await;
        });

        Ok(EventStream { receiver, cancel })
    }
}

/// Receiver half of a streaming read.
pub struct EventStream {
    receiver: mpsc::Receiver<Result<Event>>,
    cancel: CancellationToken,
}

impl EventStream {
    /// Receive the next event.
    ///
    /// Returns `None` when the stream is exhausted (end of rows, error
    /// already delivered, or cancelled).
    pub async fn recv(&mut self) -> Option<Result<Event>> {
        self.receiver.recv().await
    }

    /// Stop the producer. The channel drains whatever was already buffered
    /// and then closes.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Drain the stream into a buffer, stopping at the first error.
    pub async fn collect(mut self) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        while let Some(item) = self.recv().await {
            events.push(item?);
        }
        Ok(events)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn produce(
    store: EventStore,
    compiled: CompiledQuery,
    sender: mpsc::Sender<Result<Event>>,
    cancel: CancellationToken,
) {
    const OP: &str = "QueryStream";

    let args = match sql::bind_arguments(&compiled.binds) {
        Ok(args) => args,
        Err(e) => {
            let _ = sender.send(Err(EventStoreError::from_sqlx(OP, e))).await;
            return;
        }
    };

    let row_timeout = store.config().query_timeout;
    let mut rows = sqlx::query_as_with::<_, EventRow, _>(&compiled.sql, args).fetch(store.pool());
    let mut sent = 0usize;

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(sent, "Event stream cancelled");
                return;
            }
            next = tokio::time::timeout(row_timeout, rows.next()) => next,
        };

        let item = match next {
            // Row fetch exceeded the query timeout.
            Err(_) => Some(Err(EventStoreError::timeout(OP, row_timeout.as_millis()))),
            Ok(None) => None,
            Ok(Some(Err(e))) => Some(Err(EventStoreError::from_sqlx(OP, e))),
            Ok(Some(Ok(row))) => Some(row.into_event(OP)),
        };

        let Some(item) = item else {
            debug!(sent, "Event stream completed");
            return;
        };
        let stop_after = item.is_err();

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(sent, "Event stream cancelled");
                return;
            }
            delivered = sender.send(item) => {
                if delivered.is_err() {
                    // Consumer dropped the receiver.
                    return;
                }
            }
        }

        if stop_after {
            return;
        }
        sent += 1;
    }
}
