//! Palisade Event Store
//!
//! PostgreSQL-backed append-only event store with:
//! - Dynamic consistency boundary appends: each conditional write carries
//!   the query its decision depends on, and fails if a matching event
//!   appeared since the decision cursor
//! - Tag/type queries compiled to filtered scans in causal
//!   `(transaction_id, position)` order
//! - Advisory-lock serialization directed by `lock:` tags
//! - Buffered and bounded-stream read paths
//!
//! # Usage
//!
//! ```rust,no_run
//! use palisade_core::{AppendCondition, InputEvent, Query, Tag};
//! use palisade_store::{EventStore, StoreConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StoreConfig::new(100, 50);
//! let store = EventStore::connect("postgresql://...", config).await?;
//!
//! let event = InputEvent::new(
//!     "AccountRegistered",
//!     vec![Tag::new("username", "alice")],
//!     serde_json::json!({"username": "alice"}),
//! );
//!
//! let taken = Query::single(vec!["AccountRegistered"], vec![Tag::new("username", "alice")]);
//! store.append_if(&[event], &AppendCondition::fail_if_exists(taken)).await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

mod append;
mod codec;
pub mod config;
pub mod error;
mod locks;
mod query;
mod schema;
mod sql;
mod store;

pub use config::{valid_table_name, ConfigError, IsolationLevel, StoreConfig};
pub use error::{ErrorKind, EventStoreError, TableStructureError};
pub use query::EventStream;
pub use store::EventStore;
