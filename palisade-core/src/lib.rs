//! Palisade Core Types
//!
//! Pure value types with zero I/O dependencies: events, tags, queries,
//! cursors, append conditions, commands, and pre-flight validation.
//!
//! The store persists [`Event`]s; callers submit [`InputEvent`]s (no id,
//! position, or transaction id - those are assigned at insertion). A
//! [`Query`] is a disjunction of [`QueryItem`]s; an [`AppendCondition`]
//! pairs a query with an optional [`Cursor`] to express "fail the append
//! if anything matching this query exists after this point".

#![warn(clippy::all)]

pub mod command;
pub mod event;
pub mod query;
pub mod validation;

pub use command::Command;
pub use event::{Event, InputEvent, LockKey, Tag, LOCK_TAG_PREFIX};
pub use query::{AppendCondition, Cursor, Query, QueryItem};
pub use validation::{
    validate_batch, validate_command, validate_event, validate_query, ValidationError,
    MAX_TYPE_LEN,
};
