//! Projector definitions.
//!
//! A projector is a pure reducer with a stable id and a query filter. The
//! state type is chosen per projection batch; heterogeneous projectors
//! share a sum type.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use palisade_core::{AppendCondition, Event, Query};

use crate::error::ProjectionError;

/// A projector's transition function: `(state, event) -> state`.
///
/// Must be pure and must not panic; panics are trapped by the engine and
/// reported as errors carrying the projector id and event position.
pub type Transition<S> = Arc<dyn Fn(&S, &Event) -> S + Send + Sync>;

/// A reducer over the event stream with a stable id and a query filter.
///
/// A projector without a transition function is unrepresentable: `new`
/// requires one, so validation only has to check ids and queries.
pub struct StateProjector<S> {
    /// Unique id within a projection batch; keys the result map.
    pub id: String,
    /// Events this projector consumes.
    pub query: Query,
    /// State before any event is applied.
    pub initial_state: S,
    /// The reducer.
    pub transition: Transition<S>,
}

impl<S> StateProjector<S> {
    /// Create a projector.
    pub fn new(
        id: impl Into<String>,
        query: Query,
        initial_state: S,
        transition: impl Fn(&S, &Event) -> S + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            query,
            initial_state,
            transition: Arc::new(transition),
        }
    }
}

impl<S: Clone> Clone for StateProjector<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            query: self.query.clone(),
            initial_state: self.initial_state.clone(),
            transition: Arc::clone(&self.transition),
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for StateProjector<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateProjector")
            .field("id", &self.id)
            .field("query", &self.query)
            .field("initial_state", &self.initial_state)
            .finish_non_exhaustive()
    }
}

/// Result of a projection: final state per projector id, plus the append
/// condition that makes a subsequent write conditional on nothing relevant
/// having happened since.
#[derive(Debug, Clone)]
pub struct Projection<S> {
    /// Final state keyed by projector id.
    pub states: HashMap<String, S>,
    /// Combined query + last observed cursor, ready for `append_if`.
    pub condition: AppendCondition,
}

/// Validate a projector batch before any DB work.
///
/// Rejects an empty batch, empty ids, empty queries, and duplicate ids.
pub fn validate_projectors<S>(projectors: &[StateProjector<S>]) -> Result<(), ProjectionError> {
    if projectors.is_empty() {
        return Err(ProjectionError::InvalidProjector {
            detail: "empty projector set".to_string(),
        });
    }
    let mut seen = std::collections::HashSet::new();
    for projector in projectors {
        if projector.id.is_empty() {
            return Err(ProjectionError::InvalidProjector {
                detail: "empty projector id".to_string(),
            });
        }
        if projector.query.is_empty() {
            return Err(ProjectionError::InvalidProjector {
                detail: format!("empty projector query (projector {})", projector.id),
            });
        }
        if !seen.insert(projector.id.as_str()) {
            return Err(ProjectionError::InvalidProjector {
                detail: format!("duplicate projector id {}", projector.id),
            });
        }
    }
    Ok(())
}

/// Union of the projectors' queries, identical items merged.
pub fn combined_query<S>(projectors: &[StateProjector<S>]) -> Query {
    let mut combined = Query::empty();
    for projector in projectors {
        combined = combined.union(&projector.query);
    }
    combined
}

// =============================================================================
// Tests
// =============================================================================
