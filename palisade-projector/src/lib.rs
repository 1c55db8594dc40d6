//! Palisade Projection Engine
//!
//! Folds the event stream into in-memory decision state. A projection runs
//! a set of [`StateProjector`]s over one combined stream and returns final
//! states plus the [`AppendCondition`](palisade_core::AppendCondition) that
//! makes a subsequent `append_if` conditional on no relevant event having
//! appeared since.
//!
//! # Usage
//!
//! ```rust,no_run
//! use palisade_core::{Query, Tag};
//! use palisade_projector::{ProjectionEngine, StateProjector};
//! # async fn example(store: palisade_store::EventStore) -> Result<(), Box<dyn std::error::Error>> {
//! let enrolled = StateProjector::new(
//!     "enrolled_count",
//!     Query::single(vec!["StudentEnrolledInCourse"], vec![Tag::new("course_id", "c1")]),
//!     0i64,
//!     |count, _event| count + 1,
//! );
//!
//! let engine = ProjectionEngine::new(store);
//! let projection = engine.project(&[enrolled], None).await?;
//! let count = projection.states["enrolled_count"];
//! // projection.condition goes back into store.append_if(...)
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod engine;
pub mod error;
pub mod projector;

pub use engine::{ProjectionChannels, ProjectionEngine, ProjectionStream};
pub use error::ProjectionError;
pub use projector::{combined_query, validate_projectors, Projection, StateProjector, Transition};
