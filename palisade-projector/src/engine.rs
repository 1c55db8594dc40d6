//! Projection engine.
//!
//! Drives a set of projectors over a single combined event stream: one
//! pass, every matching projector applied per event, panics trapped. The
//! result carries the append condition a caller hands back to `append_if`
//! to enforce "nothing relevant to my decision has appeared since".

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use palisade_core::{AppendCondition, Cursor, Event, Query};
use palisade_store::{EventStore, EventStoreError, EventStream};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ProjectionError, Result};
use crate::projector::{combined_query, validate_projectors, Projection, StateProjector};

/// Drives projections against an event store.
///
/// Concurrency is bounded by the store's projection semaphore
/// (`max_concurrent_projections`) and the per-call fan-out cap
/// (`max_projection_tasks`); both reject immediately instead of queueing.
#[derive(Clone)]
pub struct ProjectionEngine {
    store: EventStore,
}

impl ProjectionEngine {
    /// Create an engine over a store handle.
    pub fn new(store: EventStore) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &EventStore {
        &self.store
    }

    /// Run the projectors to the end of the stream and return final states
    /// plus the derived append condition.
    ///
    /// Events are read after `after`; the returned condition's cursor is
    /// the last event observed, or `after` when the stream was empty.
    pub async fn project<S>(
        &self,
        projectors: &[StateProjector<S>],
        after: Option<Cursor>,
    ) -> Result<Projection<S>>
    where
        S: Clone + Send + Sync,
    {
        validate_projectors(projectors)?;
        self.check_fan_out(projectors.len())?;
        let _permit = self.store.try_acquire_projection_permit()?;

        let combined = combined_query(projectors);
        let stream = self.store.query_stream(&combined, after).await?;

        let never = CancellationToken::new();
        drive(stream, projectors, combined, after, &never).await
    }

    /// Streaming variant: same semantics, but the final states and append
    /// condition are delivered through channels when the underlying stream
    /// completes, and the projection can be cancelled mid-flight.
    pub async fn project_stream<S>(
        &self,
        projectors: Vec<StateProjector<S>>,
        after: Option<Cursor>,
    ) -> Result<ProjectionStream<S>>
    where
        S: Clone + Send + Sync + 'static,
    {
        validate_projectors(&projectors)?;
        self.check_fan_out(projectors.len())?;
        let permit = self.store.try_acquire_projection_permit()?;

        let combined = combined_query(&projectors);
        let stream = self.store.query_stream(&combined, after).await?;

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let (states_tx, states_rx) = oneshot::channel();
        let (condition_tx, condition_rx) = oneshot::channel();

        tokio::spawn(async move {
            // Hold the projection slot for the lifetime of the task.
            let _permit = permit;
            match drive(stream, &projectors, combined, after, &task_cancel).await {
                Ok(projection) => {
                    let _ = condition_tx.send(projection.condition);
                    let _ = states_tx.send(Ok(projection.states));
                }
                Err(e) => {
                    let _ = states_tx.send(Err(e));
                }
            }
        });

        Ok(ProjectionStream {
            channels: Some(ProjectionChannels { states: states_rx, condition: condition_rx }),
            cancel,
        })
    }

    /// Fan-out width is capped per call; rejection is immediate.
    fn check_fan_out(&self, width: usize) -> Result<()> {
        let max = self.store.config().max_projection_tasks;
        if width > max {
            return Err(ProjectionError::Store(EventStoreError::TooManyProjections {
                max_concurrent: max,
                current_count: width,
            }));
        }
        Ok(())
    }
}

/// Handle to an in-flight streaming projection.
///
/// Dropping the handle cancels the projection.
pub struct ProjectionStream<S> {
    channels: Option<ProjectionChannels<S>>,
    cancel: CancellationToken,
}

/// The raw result channels of a streaming projection: the final states
/// (or the error that ended the run) and the derived append condition.
/// The condition channel closes unresolved when the projection fails.
pub struct ProjectionChannels<S> {
    /// Final states, delivered when the stream completes.
    pub states: oneshot::Receiver<Result<HashMap<String, S>>>,
    /// Derived append condition, delivered on success.
    pub condition: oneshot::Receiver<AppendCondition>,
}

impl<S> ProjectionStream<S> {
    /// Cancel the projection. The states channel resolves with a
    /// cancellation error.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Await completion: final states and the derived append condition.
    pub async fn finish(mut self) -> Result<Projection<S>> {
        let channels = self.channels.take().ok_or(ProjectionError::Cancelled)?;
        let states = channels.states.await.map_err(|_| ProjectionError::Cancelled)??;
        let condition = channels.condition.await.map_err(|_| ProjectionError::Cancelled)?;
        Ok(Projection { states, condition })
    }

    /// Take the raw channels. The handle keeps its cancel-on-drop behavior,
    /// so hold it for as long as the channels are in use. A later `finish`
    /// on the emptied handle reports cancellation.
    pub fn into_channels(&mut self) -> Option<ProjectionChannels<S>> {
        self.channels.take()
    }
}

impl<S> Drop for ProjectionStream<S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Consume the stream, applying every matching projector per event.
async fn drive<S>(
    mut stream: EventStream,
    projectors: &[StateProjector<S>],
    combined: Query,
    after: Option<Cursor>,
    cancel: &CancellationToken,
) -> Result<Projection<S>>
where
    S: Clone,
{
    let mut states: Vec<S> =
        projectors.iter().map(|p| p.initial_state.clone()).collect();
    let mut last: Option<Cursor> = None;
    let mut observed = 0usize;

    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => return Err(ProjectionError::Cancelled),
            item = stream.recv() => item,
        };

        let event = match item {
            Some(Ok(event)) => event,
            Some(Err(e)) => return Err(e.into()),
            None => break,
        };

        for (projector, state) in projectors.iter().zip(states.iter_mut()) {
            if projector.query.matches(&event) {
                *state = apply(projector, state, &event)?;
            }
        }

        last = Some(event.cursor());
        observed += 1;
    }

    debug!(observed, projectors = projectors.len(), "Projection completed");

    let states = projectors
        .iter()
        .zip(states)
        .map(|(projector, state)| (projector.id.clone(), state))
        .collect();
    let condition = AppendCondition { query: combined, after: last.or(after) };

    Ok(Projection { states, condition })
}

/// Apply one transition with the panic trap.
fn apply<S>(projector: &StateProjector<S>, state: &S, event: &Event) -> Result<S> {
    catch_unwind(AssertUnwindSafe(|| (projector.transition)(state, event))).map_err(|payload| {
        ProjectionError::TransitionPanicked {
            projector_id: projector.id.clone(),
            position: event.position,
            event_type: event.event_type.clone(),
            message: panic_message(payload),
        }
    })
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "transition panicked".to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use palisade_core::Tag;
    use serde_json::json;
    use uuid::Uuid;

    fn event(event_type: &str, tags: Vec<Tag>, txid: i64, position: i64) -> Event {
        Event {
            id: Uuid::now_v7(),
            event_type: event_type.to_string(),
            tags,
            data: json!({}),
            transaction_id: txid,
            position,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn test_apply_traps_panics_with_context() {
        let projector = StateProjector::new(
            "boom",
            Query::all(),
            0i64,
            |_state: &i64, _event: &Event| -> i64 { panic!("bad transition") },
        );
        let event = event("X", vec![Tag::new("k", "v")], 5, 9);

        let err = apply(&projector, &0, &event).unwrap_err();
        match err {
            ProjectionError::TransitionPanicked {
                projector_id,
                position,
                event_type,
                message,
            } => {
                assert_eq!(projector_id, "boom");
                assert_eq!(position, 9);
                assert_eq!(event_type, "X");
                assert!(message.contains("bad transition"));
            }
            other => panic!("expected TransitionPanicked, got {:?}", other),
        }
    }

    #[test]
    fn test_apply_returns_next_state() {
        let projector =
            StateProjector::new("count", Query::all(), 0i64, |state: &i64, _| state + 1);
        let event = event("X", vec![Tag::new("k", "v")], 1, 1);

        assert_eq!(apply(&projector, &41, &event).unwrap(), 42);
    }

    #[test]
    fn test_panic_message_variants() {
        assert_eq!(panic_message(Box::new("str panic")), "str panic");
        assert_eq!(panic_message(Box::new("owned".to_string())), "owned");
        assert_eq!(panic_message(Box::new(17u8)), "transition panicked");
    }
}
