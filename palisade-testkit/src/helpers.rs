//! Store construction and seeding helpers.

use anyhow::Result;
use serde_json::json;
use sqlx::PgPool;

use palisade_core::{Cursor, InputEvent, Tag};
use palisade_store::{EventStore, StoreConfig};

/// Initialize tracing for a test binary, honoring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build a verified store over a test pool with the standard test config.
pub async fn test_store(pool: PgPool) -> Result<EventStore> {
    test_store_with(pool, StoreConfig::test()).await
}

/// Build a verified store over a test pool with a custom config.
pub async fn test_store_with(pool: PgPool, config: StoreConfig) -> Result<EventStore> {
    Ok(EventStore::new(pool, config).await?)
}

/// Tag list from `(key, value)` pairs.
pub fn tags(pairs: &[(&str, &str)]) -> Vec<Tag> {
    pairs.iter().map(|(k, v)| Tag::new(*k, *v)).collect()
}

/// Input event fixture.
pub fn input_event(
    event_type: &str,
    pairs: &[(&str, &str)],
    data: serde_json::Value,
) -> InputEvent {
    InputEvent::new(event_type, tags(pairs), data)
}

/// Seed an `AccountRegistered` event for a username.
pub async fn seed_account_registered(store: &EventStore, username: &str) -> Result<Cursor> {
    let event = input_event(
        "AccountRegistered",
        &[("username", username)],
        json!({"username": username}),
    );
    Ok(store.append(&[event]).await?)
}

/// Seed a `StudentEnrolledInCourse` event.
pub async fn seed_enrollment(
    store: &EventStore,
    course_id: &str,
    student_id: &str,
) -> Result<Cursor> {
    let event = input_event(
        "StudentEnrolledInCourse",
        &[("course_id", course_id), ("student_id", student_id)],
        json!({"course_id": course_id, "student_id": student_id}),
    );
    Ok(store.append(&[event]).await?)
}
