//! Test helpers for Palisade database-backed tests.
//!
//! Provides store construction over `#[sqlx::test]` pools, event fixtures,
//! and seeding helpers for the common scenario shapes.

mod helpers;

pub use helpers::{
    init_tracing, input_event, seed_account_registered, seed_enrollment, tags, test_store,
    test_store_with,
};

use anyhow::Result;
use sqlx::PgPool;

/// Setup a clean test database: run the workspace migrations through the
/// lifecycle crate's embedded migrator.
///
/// Convenience for tests that build their own pool; `#[sqlx::test]` users
/// pass `migrations = "../migrations"` instead.
pub async fn setup_test_db(pool: &PgPool) -> Result<()> {
    palisade_db::migrate(pool).await?;
    Ok(())
}
