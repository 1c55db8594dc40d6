//! Integration tests for the query and stream engines.

use palisade_core::{Query, QueryItem, Tag};
use palisade_store::{ErrorKind, EventStoreError, StoreConfig};
use palisade_testkit::{input_event, test_store, test_store_with};
use serde_json::json;
use sqlx::PgPool;

#[sqlx::test(migrations = "../migrations")]
async fn test_empty_query_returns_nothing(pool: PgPool) {
    let store = test_store(pool).await.unwrap();
    store.append(&[input_event("X", &[("k", "v")], json!({}))]).await.unwrap();

    let events = store.query(&Query::empty(), None).await.unwrap();
    assert!(events.is_empty());
}

#[sqlx::test(migrations = "../migrations")]
async fn test_match_all_returns_everything_in_causal_order(pool: PgPool) {
    let store = test_store(pool).await.unwrap();
    for i in 0..5 {
        store
            .append(&[input_event("X", &[("n", &i.to_string())], json!({"n": i}))])
            .await
            .unwrap();
    }

    let events = store.query(&Query::all(), None).await.unwrap();
    assert_eq!(events.len(), 5);
    for window in events.windows(2) {
        assert!(
            (window[0].transaction_id, window[0].position)
                < (window[1].transaction_id, window[1].position)
        );
    }
}

#[sqlx::test(migrations = "../migrations")]
async fn test_type_and_tag_filters(pool: PgPool) {
    let store = test_store(pool).await.unwrap();
    store
        .append(&[
            input_event("CourseDefined", &[("course_id", "c1")], json!({"capacity": 1})),
            input_event(
                "StudentEnrolledInCourse",
                &[("course_id", "c1"), ("student_id", "s1")],
                json!({}),
            ),
            input_event(
                "StudentEnrolledInCourse",
                &[("course_id", "c2"), ("student_id", "s1")],
                json!({}),
            ),
        ])
        .await
        .unwrap();

    // Type + tag: enrollments on c1 only.
    let enrolled_c1 = store
        .query(
            &Query::single(vec!["StudentEnrolledInCourse"], vec![Tag::new("course_id", "c1")]),
            None,
        )
        .await
        .unwrap();
    assert_eq!(enrolled_c1.len(), 1);

    // Tag containment: everything touching c1, any type.
    let touching_c1 = store
        .query(&Query::single(Vec::<String>::new(), vec![Tag::new("course_id", "c1")]), None)
        .await
        .unwrap();
    assert_eq!(touching_c1.len(), 2);

    // Disjunction across items.
    let either_course = store
        .query(
            &Query::from_items(vec![
                QueryItem::new(Vec::<String>::new(), vec![Tag::new("course_id", "c1")]),
                QueryItem::new(Vec::<String>::new(), vec![Tag::new("course_id", "c2")]),
            ]),
            None,
        )
        .await
        .unwrap();
    assert_eq!(either_course.len(), 3);
}

#[sqlx::test(migrations = "../migrations")]
async fn test_cursor_resumption_inside_a_transaction(pool: PgPool) {
    let store = test_store(pool).await.unwrap();

    // One batch of 4: all share a txid.
    let batch: Vec<_> =
        (0..4).map(|i| input_event("Step", &[("n", &i.to_string())], json!({"n": i}))).collect();
    store.append(&batch).await.unwrap();

    let all = store.query(&Query::all(), None).await.unwrap();
    assert_eq!(all.len(), 4);
    let txid = all[0].transaction_id;

    // Resume after the second event.
    let cursor = all[1].cursor();
    let rest = store.query(&Query::all(), Some(cursor)).await.unwrap();

    assert_eq!(rest.len(), 2);
    assert_eq!(rest[0].data, json!({"n": 2}));
    assert_eq!(rest[1].data, json!({"n": 3}));
    assert!(rest.iter().all(|e| e.transaction_id == txid));
}

#[sqlx::test(migrations = "../migrations")]
async fn test_cursor_at_end_yields_nothing(pool: PgPool) {
    let store = test_store(pool).await.unwrap();
    let cursor = store.append(&[input_event("X", &[("k", "v")], json!({}))]).await.unwrap();

    let after_end = store.query(&Query::all(), Some(cursor)).await.unwrap();
    assert!(after_end.is_empty());
}

#[sqlx::test(migrations = "../migrations")]
async fn test_stream_yields_same_events_as_buffered_query(pool: PgPool) {
    let store = test_store(pool).await.unwrap();
    for i in 0..20 {
        store
            .append(&[input_event("X", &[("n", &i.to_string())], json!({"n": i}))])
            .await
            .unwrap();
    }

    let buffered = store.query(&Query::all(), None).await.unwrap();
    let streamed =
        store.query_stream(&Query::all(), None).await.unwrap().collect().await.unwrap();

    assert_eq!(streamed, buffered);
}

#[sqlx::test(migrations = "../migrations")]
async fn test_stream_respects_small_buffer(pool: PgPool) {
    let config = StoreConfig::test().with_stream_buffer(2);
    let store = test_store_with(pool, config).await.unwrap();
    for i in 0..10 {
        store
            .append(&[input_event("X", &[("n", &i.to_string())], json!({"n": i}))])
            .await
            .unwrap();
    }

    // Slow consumer: the producer blocks on the full buffer but every
    // event still arrives, in order.
    let mut stream = store.query_stream(&Query::all(), None).await.unwrap();
    let mut seen = 0;
    while let Some(item) = stream.recv().await {
        item.unwrap();
        seen += 1;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert_eq!(seen, 10);
}

#[sqlx::test(migrations = "../migrations")]
async fn test_stream_cancellation_closes_channel(pool: PgPool) {
    let store = test_store(pool).await.unwrap();
    for i in 0..50 {
        store
            .append(&[input_event("X", &[("n", &i.to_string())], json!({"n": i}))])
            .await
            .unwrap();
    }

    let mut stream = store.query_stream(&Query::all(), None).await.unwrap();
    let first = stream.recv().await.unwrap().unwrap();
    assert_eq!(first.data, json!({"n": 0}));

    stream.cancel();

    // The channel must close within one buffer's worth of events.
    let mut drained = 0;
    while stream.recv().await.is_some() {
        drained += 1;
        assert!(drained <= store.config().stream_buffer, "channel did not close after cancel");
    }
}

#[sqlx::test(migrations = "../migrations")]
async fn test_close_is_idempotent_and_fails_fast(pool: PgPool) {
    let store = test_store(pool).await.unwrap();
    store.append(&[input_event("X", &[("k", "v")], json!({}))]).await.unwrap();

    store.close().await;
    store.close().await;
    assert!(store.is_closed());

    let query_err = store.query(&Query::all(), None).await.unwrap_err();
    assert_eq!(query_err.kind(), ErrorKind::Unavailable);

    let append_err =
        store.append(&[input_event("X", &[("k", "v")], json!({}))]).await.unwrap_err();
    assert_eq!(append_err.kind(), ErrorKind::Unavailable);
    assert!(append_err.to_string().contains("store is closed"));
}

#[sqlx::test(migrations = "../migrations")]
async fn test_missing_table_fails_construction(pool: PgPool) {
    let config = StoreConfig::test().with_events_table("missing_events");

    let err = test_store_with(pool, config).await.unwrap_err();
    let err = err.downcast::<EventStoreError>().unwrap();

    match err {
        EventStoreError::TableStructure(structure) => {
            assert_eq!(structure.table_name, "missing_events");
            assert_eq!(structure.issue, "table not found");
        }
        other => panic!("expected TableStructure, got {:?}", other),
    }
}

#[sqlx::test(migrations = "../migrations")]
async fn test_drifted_column_type_fails_construction(pool: PgPool) {
    sqlx::query(
        "CREATE TABLE bad_events (
            position BIGSERIAL PRIMARY KEY,
            id UUID NOT NULL,
            type TEXT NOT NULL,
            tags TEXT NOT NULL,
            data JSONB NOT NULL,
            transaction_id BIGINT NOT NULL,
            occurred_at TIMESTAMPTZ NOT NULL
        )",
    )
    .execute(&pool)
    .await
    .unwrap();

    let config = StoreConfig::test().with_events_table("bad_events");
    let err = test_store_with(pool, config).await.unwrap_err();
    let err = err.downcast::<EventStoreError>().unwrap();

    match err {
        EventStoreError::TableStructure(structure) => {
            assert_eq!(structure.column_name, "tags");
            assert_eq!(structure.issue, "unexpected type");
            assert_eq!(structure.expected_type, "ARRAY");
        }
        other => panic!("expected TableStructure, got {:?}", other),
    }
}
