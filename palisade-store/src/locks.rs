//! Advisory-lock coordination.
//!
//! Lock names hash into the 64-bit key space PostgreSQL advisory locks
//! accept (SHA-256, first 8 bytes). Keys are acquired in lexicographic name
//! order inside the insert transaction; since every writer uses the same
//! total order, overlapping lock sets cannot form a cycle.
//! `pg_advisory_xact_lock` releases at commit/rollback, so there is no
//! unlock path.

use palisade_core::{InputEvent, LockKey};
use sha2::{Digest, Sha256};
use sqlx::{Postgres, Transaction};
use tracing::debug;

/// Derive the 64-bit advisory-lock key for a lock name.
pub(crate) fn advisory_key(lock: &LockKey) -> i64 {
    let digest = Sha256::digest(lock.as_str().as_bytes());
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(buf)
}

/// Lock keys for a batch: merged across events, deduplicated, sorted.
pub(crate) fn batch_lock_keys(events: &[InputEvent]) -> Vec<LockKey> {
    let mut keys: Vec<LockKey> = events.iter().flat_map(InputEvent::lock_keys).collect();
    keys.sort();
    keys.dedup();
    keys
}

/// Canonical acquisition order for an explicit lock list.
pub(crate) fn sort_keys(locks: &[LockKey]) -> Vec<LockKey> {
    let mut keys = locks.to_vec();
    keys.sort();
    keys.dedup();
    keys
}

/// Acquire transaction-scoped advisory locks, one round-trip per key.
///
/// Callers pass keys already in canonical order.
pub(crate) async fn acquire(
    tx: &mut Transaction<'_, Postgres>,
    keys: &[LockKey],
) -> Result<(), sqlx::Error> {
    for key in keys {
        let hashed = advisory_key(key);
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(hashed)
            .execute(&mut **tx)
            .await?;

        debug!(lock = %key, key = hashed, "Advisory lock acquired");
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use palisade_core::Tag;
    use serde_json::json;

    #[test]
    fn test_advisory_key_is_deterministic() {
        let key = LockKey::new("resource:R");
        assert_eq!(advisory_key(&key), advisory_key(&LockKey::new("resource:R")));
        assert_ne!(advisory_key(&key), advisory_key(&LockKey::new("resource:S")));
    }

    #[test]
    fn test_batch_keys_merged_sorted_deduped() {
        let events = vec![
            InputEvent::new(
                "A",
                vec![Tag::new("lock:zebra", "1"), Tag::new("k", "v")],
                json!({}),
            ),
            InputEvent::new(
                "B",
                vec![Tag::new("lock:apple", "1"), Tag::new("lock:zebra", "1")],
                json!({}),
            ),
        ];

        let keys = batch_lock_keys(&events);
        assert_eq!(keys, vec![LockKey::new("apple:1"), LockKey::new("zebra:1")]);
    }

    #[test]
    fn test_batch_without_lock_tags_yields_no_keys() {
        let events = vec![InputEvent::new("A", vec![Tag::new("k", "v")], json!({}))];
        assert!(batch_lock_keys(&events).is_empty());
    }

    #[test]
    fn test_sort_keys_is_total_order() {
        let locks = vec![
            LockKey::new("b:2"),
            LockKey::new("a:1"),
            LockKey::new("b:2"),
            LockKey::new("a:10"),
        ];

        let sorted = sort_keys(&locks);
        assert_eq!(
            sorted,
            vec![LockKey::new("a:1"), LockKey::new("a:10"), LockKey::new("b:2")]
        );
    }
}
