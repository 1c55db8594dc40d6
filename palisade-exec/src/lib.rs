//! Palisade Command Executor
//!
//! Thin coordinator between user command handlers and the append engine:
//! run the handler, validate what it produced, append under the caller's
//! consistency boundary and/or explicit advisory locks.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use palisade_core::Command;
//! use palisade_exec::CommandExecutor;
//! # async fn example(
//! #     store: palisade_store::EventStore,
//! #     handler: impl palisade_exec::CommandHandler,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let executor = CommandExecutor::new(Arc::new(store));
//! let command = Command::new("RegisterAccount", serde_json::json!({"username": "alice"}));
//! let outcome = executor.execute_command(&command, &handler, None).await?;
//! println!("appended {} events at {}", outcome.events.len(), outcome.cursor);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod error;
pub mod executor;
pub mod ports;
pub mod stub;

pub use error::ExecError;
pub use executor::{CommandExecutor, CommandOutcome};
pub use ports::{AppendPort, CommandHandler};
pub use stub::{StubHandler, StubStore};
