//! Event and tag types.
//!
//! [`InputEvent`] is what callers submit; [`Event`] is what the store
//! returns. The store assigns `id`, `transaction_id`, `position`, and
//! `occurred_at` at insertion, so the two are deliberately separate types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::query::Cursor;

/// Tag keys starting with this prefix are advisory-lock directives.
///
/// A tag `lock:resource=R` instructs the append engine to take the advisory
/// lock named `resource:R` for the duration of the insert transaction. Lock
/// tags are never persisted.
pub const LOCK_TAG_PREFIX: &str = "lock:";

// =============================================================================
// Tag
// =============================================================================

/// A `key:value` pair attached to an event.
///
/// Tags drive query matching: an event matches a query item when its tag
/// set contains every tag the item requires. Both key and value must be
/// non-empty; the validator enforces this before any DB work.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tag {
    /// Tag key (e.g., "course_id")
    pub key: String,
    /// Tag value (e.g., "c1")
    pub value: String,
}

impl Tag {
    /// Create a new tag.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), value: value.into() }
    }

    /// Canonical wire form: `"key:value"`.
    pub fn encoded(&self) -> String {
        format!("{}:{}", self.key, self.value)
    }

    /// Parse a `"key:value"` string (split on the first colon).
    ///
    /// Returns `None` when no colon is present. Values may themselves
    /// contain colons; keys may not.
    pub fn parse(encoded: &str) -> Option<Self> {
        let (key, value) = encoded.split_once(':')?;
        Some(Self::new(key, value))
    }

    /// Is this tag an advisory-lock directive?
    pub fn is_lock(&self) -> bool {
        self.key.starts_with(LOCK_TAG_PREFIX)
    }

    /// Lock key for a lock tag: `lock:resource=R` locks `resource:R`.
    ///
    /// Returns `None` for ordinary tags.
    pub fn lock_key(&self) -> Option<LockKey> {
        let suffix = self.key.strip_prefix(LOCK_TAG_PREFIX)?;
        Some(LockKey::new(format!("{}:{}", suffix, self.value)))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key, self.value)
    }
}

// =============================================================================
// LockKey
// =============================================================================

/// Name of an application-level advisory lock.
///
/// The append engine hashes lock keys into the 64-bit space PostgreSQL
/// advisory locks accept, and always acquires them in lexicographic order
/// so overlapping lock sets cannot deadlock.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LockKey(String);

impl LockKey {
    /// Create a lock key from its name (e.g., "resource:R").
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The lock name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// InputEvent
// =============================================================================

/// An event as submitted for appending.
///
/// Carries no id, position, or transaction id - the store assigns those.
/// Lock-prefixed tags are directives to the append engine and are stripped
/// before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputEvent {
    /// Event type (e.g., "CourseDefined"). Non-empty, at most 64 chars.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Tag set. At least one tag; no empty keys or values.
    pub tags: Vec<Tag>,
    /// JSON payload.
    pub data: serde_json::Value,
}

impl InputEvent {
    /// Create a new input event.
    pub fn new(
        event_type: impl Into<String>,
        tags: Vec<Tag>,
        data: serde_json::Value,
    ) -> Self {
        Self { event_type: event_type.into(), tags, data }
    }

    /// Create an input event from raw JSON bytes.
    ///
    /// # Errors
    /// Returns a [`ValidationError`](crate::ValidationError) when the bytes
    /// are not syntactically valid JSON.
    pub fn try_new(
        event_type: impl Into<String>,
        tags: Vec<Tag>,
        raw: &[u8],
    ) -> Result<Self, crate::ValidationError> {
        let data: serde_json::Value = serde_json::from_slice(raw).map_err(|e| {
            crate::ValidationError::new(
                "data",
                String::from_utf8_lossy(raw),
                format!("not valid JSON: {}", e),
            )
        })?;
        Ok(Self { event_type: event_type.into(), tags, data })
    }

    /// Add a tag (builder style).
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push(Tag::new(key, value));
        self
    }

    /// Does any tag carry the lock prefix?
    pub fn has_lock_tags(&self) -> bool {
        self.tags.iter().any(Tag::is_lock)
    }

    /// Lock keys derived from this event's lock tags.
    pub fn lock_keys(&self) -> Vec<LockKey> {
        self.tags.iter().filter_map(Tag::lock_key).collect()
    }

    /// Tags with lock directives removed - what actually persists.
    pub fn persisted_tags(&self) -> Vec<Tag> {
        self.tags.iter().filter(|t| !t.is_lock()).cloned().collect()
    }
}

// =============================================================================
// Event
// =============================================================================

/// A persisted event row.
///
/// `(transaction_id, position)` is the sole authoritative ordering key.
/// `position` alone is not a causal order under concurrency: a fast short
/// transaction can take a later position than a slow one that started
/// earlier, yet commit first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier (UUIDv7, roughly time-sortable).
    pub id: Uuid,
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Tag set. Never contains lock-prefixed tags.
    pub tags: Vec<Tag>,
    /// JSON payload.
    pub data: serde_json::Value,
    /// Database transaction id at insertion. Carries causality: if
    /// transaction A committed before B started, A.txid < B.txid.
    pub transaction_id: i64,
    /// Monotonic row identifier. Unique; gaps are normal.
    pub position: i64,
    /// Insertion timestamp.
    pub occurred_at: DateTime<Utc>,
}

impl Event {
    /// Resume point at this event: reads after it skip this event.
    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.transaction_id, self.position)
    }

    /// Does the event carry the given tag?
    pub fn has_tag(&self, tag: &Tag) -> bool {
        self.tags.contains(tag)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tag_encoding_round_trip() {
        let tag = Tag::new("course_id", "c1");
        assert_eq!(tag.encoded(), "course_id:c1");
        assert_eq!(Tag::parse("course_id:c1"), Some(tag));
    }

    #[test]
    fn test_tag_parse_value_with_colon() {
        let tag = Tag::parse("url:https://example.com").unwrap();
        assert_eq!(tag.key, "url");
        assert_eq!(tag.value, "https://example.com");
    }

    #[test]
    fn test_tag_parse_rejects_no_colon() {
        assert_eq!(Tag::parse("plain"), None);
    }

    #[test]
    fn test_lock_tag_detection() {
        let lock = Tag::new("lock:resource", "R");
        let plain = Tag::new("resource", "R");

        assert!(lock.is_lock());
        assert!(!plain.is_lock());
        assert_eq!(lock.lock_key(), Some(LockKey::new("resource:R")));
        assert_eq!(plain.lock_key(), None);
    }

    #[test]
    fn test_input_event_strips_lock_tags() {
        let event = InputEvent::new(
            "ResourceUsageUpdated",
            vec![Tag::new("resource", "R"), Tag::new("lock:resource", "R")],
            json!({"used": 1}),
        );

        assert!(event.has_lock_tags());
        assert_eq!(event.lock_keys(), vec![LockKey::new("resource:R")]);
        assert_eq!(event.persisted_tags(), vec![Tag::new("resource", "R")]);
    }

    #[test]
    fn test_input_event_try_new_rejects_bad_json() {
        let err = InputEvent::try_new("X", vec![Tag::new("a", "b")], b"{not json").unwrap_err();
        assert_eq!(err.field, "data");
    }

    #[test]
    fn test_input_event_try_new_accepts_json() {
        let event =
            InputEvent::try_new("X", vec![Tag::new("a", "b")], br#"{"n": 1}"#).unwrap();
        assert_eq!(event.data, json!({"n": 1}));
    }

    #[test]
    fn test_event_cursor() {
        let event = Event {
            id: Uuid::now_v7(),
            event_type: "AccountRegistered".to_string(),
            tags: vec![Tag::new("username", "alice")],
            data: json!({}),
            transaction_id: 42,
            position: 7,
            occurred_at: Utc::now(),
        };

        assert_eq!(event.cursor(), Cursor::new(42, 7));
    }
}
