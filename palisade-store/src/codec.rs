//! Row codec: persisted row ↔ event value.
//!
//! Tags persist as a sorted text array of `"key:value"` strings. Sorting
//! makes the encoding canonical, so two tag sets are equal exactly when
//! their arrays are equal, and containment queries stay cheap under the
//! GIN index.

use chrono::{DateTime, Utc};
use palisade_core::{Event, Tag};
use uuid::Uuid;

use crate::error::EventStoreError;

/// Database row shape for the events table.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EventRow {
    pub id: Uuid,
    #[sqlx(rename = "type")]
    pub event_type: String,
    pub tags: Vec<String>,
    pub data: serde_json::Value,
    pub transaction_id: i64,
    pub position: i64,
    pub occurred_at: DateTime<Utc>,
}

impl EventRow {
    /// Decode a row into an event value.
    pub fn into_event(self, operation: &'static str) -> Result<Event, EventStoreError> {
        let tags = decode_tags(&self.tags, operation)?;
        Ok(Event {
            id: self.id,
            event_type: self.event_type,
            tags,
            data: self.data,
            transaction_id: self.transaction_id,
            position: self.position,
            occurred_at: self.occurred_at,
        })
    }
}

/// Encode a tag set into its canonical stored form: sorted, deduplicated
/// `"key:value"` strings.
pub(crate) fn encode_tags(tags: &[Tag]) -> Vec<String> {
    let mut encoded: Vec<String> = tags.iter().map(Tag::encoded).collect();
    encoded.sort();
    encoded.dedup();
    encoded
}

/// Decode a stored tag array.
pub(crate) fn decode_tags(
    encoded: &[String],
    operation: &'static str,
) -> Result<Vec<Tag>, EventStoreError> {
    encoded
        .iter()
        .map(|raw| {
            Tag::parse(raw).ok_or_else(|| EventStoreError::Decode {
                operation,
                detail: format!("malformed tag {:?}", raw),
            })
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
