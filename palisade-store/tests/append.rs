//! Integration tests for the append engine.
//!
//! Run with a PostgreSQL `DATABASE_URL` available; each test gets its own
//! database via `#[sqlx::test]`.

use palisade_core::{Query, Tag};
use palisade_store::{ErrorKind, EventStoreError};
use palisade_testkit::{input_event, test_store};
use serde_json::json;
use sqlx::PgPool;

#[sqlx::test(migrations = "../migrations")]
async fn test_append_returns_cursor_of_last_event(pool: PgPool) {
    let store = test_store(pool).await.unwrap();

    let batch = vec![
        input_event("A", &[("k", "1")], json!({})),
        input_event("B", &[("k", "2")], json!({})),
    ];
    let cursor = store.append(&batch).await.unwrap();

    let events = store.query(&Query::all(), None).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events.last().unwrap().cursor(), cursor);
}

#[sqlx::test(migrations = "../migrations")]
async fn test_batch_shares_txid_with_increasing_positions(pool: PgPool) {
    let store = test_store(pool).await.unwrap();

    let batch: Vec<_> = (0..4)
        .map(|i| input_event("Numbered", &[("n", &i.to_string())], json!({"n": i})))
        .collect();
    store.append(&batch).await.unwrap();

    let events = store.query(&Query::all(), None).await.unwrap();
    assert_eq!(events.len(), 4);

    let txid = events[0].transaction_id;
    for window in events.windows(2) {
        assert_eq!(window[1].transaction_id, txid, "batch must share one txid");
        assert!(window[1].position > window[0].position, "positions must increase");
    }

    // Submission order preserved.
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.data, json!({"n": i}));
    }
}

#[sqlx::test(migrations = "../migrations")]
async fn test_empty_batch_is_rejected(pool: PgPool) {
    let store = test_store(pool).await.unwrap();

    let err = store.append(&[]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let events = store.query(&Query::all(), None).await.unwrap();
    assert!(events.is_empty());
}

#[sqlx::test(migrations = "../migrations")]
async fn test_oversized_batch_is_rejected(pool: PgPool) {
    let store = test_store(pool).await.unwrap();
    let max = store.config().max_batch_size;

    let batch: Vec<_> =
        (0..max + 1).map(|i| input_event("X", &[("n", &i.to_string())], json!({}))).collect();

    let err = store.append(&batch).await.unwrap_err();
    assert!(matches!(err, EventStoreError::Validation { .. }));
}

#[sqlx::test(migrations = "../migrations")]
async fn test_invalid_events_are_rejected_before_db_work(pool: PgPool) {
    let store = test_store(pool).await.unwrap();

    // Empty tag set.
    let no_tags = input_event("X", &[], json!({}));
    assert!(matches!(
        store.append(&[no_tags]).await.unwrap_err(),
        EventStoreError::Validation { .. }
    ));

    // Empty type.
    let no_type = input_event("", &[("k", "v")], json!({}));
    assert!(matches!(
        store.append(&[no_type]).await.unwrap_err(),
        EventStoreError::Validation { .. }
    ));

    assert!(store.query(&Query::all(), None).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../migrations")]
async fn test_lock_tags_never_persist(pool: PgPool) {
    let store = test_store(pool).await.unwrap();

    let event = input_event(
        "ResourceUsageUpdated",
        &[("resource", "R"), ("lock:resource", "R")],
        json!({"used": 1}),
    );
    store.append(&[event]).await.unwrap();

    let events = store.query(&Query::all(), None).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].tags, vec![Tag::new("resource", "R")]);
    assert!(events[0].tags.iter().all(|t| !t.key.starts_with("lock:")));
}

#[sqlx::test(migrations = "../migrations")]
async fn test_tags_persist_in_canonical_sorted_form(pool: PgPool) {
    let store = test_store(pool).await.unwrap();

    let event = input_event("X", &[("zeta", "1"), ("alpha", "2")], json!({}));
    store.append(&[event]).await.unwrap();

    let events = store.query(&Query::all(), None).await.unwrap();
    assert_eq!(events[0].tags, vec![Tag::new("alpha", "2"), Tag::new("zeta", "1")]);
}

#[sqlx::test(migrations = "../migrations")]
async fn test_data_round_trips(pool: PgPool) {
    let store = test_store(pool).await.unwrap();

    let payload = json!({
        "nested": {"deep": [1, 2, 3]},
        "text": "with \"quotes\" and unicode: \u{e9}",
        "null_field": null
    });
    let event = input_event("Payload", &[("k", "v")], payload.clone());
    store.append(&[event]).await.unwrap();

    let events = store.query(&Query::all(), None).await.unwrap();
    assert_eq!(events[0].data, payload);
    assert_eq!(events[0].event_type, "Payload");
}

#[sqlx::test(migrations = "../migrations")]
async fn test_ten_concurrent_lock_tagged_appends_all_succeed(pool: PgPool) {
    let store = test_store(pool).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..10 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let event = input_event(
                "ResourceUsageUpdated",
                &[("resource", "R"), ("lock:resource", "R")],
                json!({"writer": i}),
            );
            store.append(&[event]).await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let events = store.query(&Query::all(), None).await.unwrap();
    assert_eq!(events.len(), 10);

    // Reads come back ordered by txid; each append was its own transaction.
    for window in events.windows(2) {
        assert!(window[0].transaction_id < window[1].transaction_id);
    }
}

#[sqlx::test(migrations = "../migrations")]
async fn test_txid_order_follows_append_start_order(pool: PgPool) {
    let store = test_store(pool).await.unwrap();

    // Three concurrent writers that sleep before touching the store. The
    // one that starts its transaction first commits first, so txid order
    // must equal start order regardless of spawn interleaving.
    let mut handles = Vec::new();
    for (sleep_ms, name) in [(100u64, "slow"), (10, "fast"), (50, "medium")] {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(sleep_ms)).await;
            let event = input_event("Started", &[("writer", name)], json!({"sleep": sleep_ms}));
            let cursor = store.append(&[event]).await.unwrap();
            (sleep_ms, cursor)
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results.sort_by_key(|(sleep_ms, _)| *sleep_ms);

    for window in results.windows(2) {
        assert!(
            window[0].1.transaction_id < window[1].1.transaction_id,
            "earlier start must get smaller txid: {:?}",
            results
        );
    }
}
