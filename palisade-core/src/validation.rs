//! Pre-flight validation.
//!
//! Validation is total: when these functions return `Ok`, downstream
//! components may assume structural correctness and skip re-checking.
//! Nothing here touches the database.

use crate::command::Command;
use crate::event::InputEvent;
use crate::query::Query;

/// Maximum length of an event or command type.
pub const MAX_TYPE_LEN: usize = 64;

/// A structural validation failure.
///
/// Carries the offending field and value so callers can discriminate
/// programmatically instead of parsing messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Field that failed (e.g., "type", "tags", "batch").
    pub field: String,
    /// Offending value, stringified.
    pub value: String,
    /// Human-readable reason.
    pub message: String,
}

impl ValidationError {
    /// Create a validation error.
    pub fn new(
        field: impl Into<String>,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self { field: field.into(), value: value.into(), message: message.into() }
    }
}

/// Validate a single input event.
///
/// Rejects: empty type, over-long type, empty tag set, any tag with an
/// empty key or value.
pub fn validate_event(event: &InputEvent) -> Result<(), ValidationError> {
    if event.event_type.is_empty() {
        return Err(ValidationError::new("type", "", "empty event type"));
    }
    if event.event_type.len() > MAX_TYPE_LEN {
        return Err(ValidationError::new(
            "type",
            &event.event_type,
            format!("event type exceeds {} chars", MAX_TYPE_LEN),
        ));
    }
    if event.tags.is_empty() {
        return Err(ValidationError::new("tags", "", "empty tag set"));
    }
    for tag in &event.tags {
        if tag.key.is_empty() {
            return Err(ValidationError::new("tags", tag.encoded(), "empty tag key"));
        }
        if tag.value.is_empty() {
            return Err(ValidationError::new("tags", tag.encoded(), "empty tag value"));
        }
    }
    Ok(())
}

/// Validate a batch of input events.
///
/// Rejects size 0 and size > `max_batch_size`, then validates each event.
pub fn validate_batch(
    events: &[InputEvent],
    max_batch_size: usize,
) -> Result<(), ValidationError> {
    if events.is_empty() {
        return Err(ValidationError::new("batch", "0", "empty batch"));
    }
    if events.len() > max_batch_size {
        return Err(ValidationError::new(
            "batch",
            events.len().to_string(),
            format!("batch exceeds max size {}", max_batch_size),
        ));
    }
    for event in events {
        validate_event(event)?;
    }
    Ok(())
}

/// Validate a query used in an append condition.
///
/// Same tag constraints as events, plus: no empty strings in an item's
/// type list. An empty query is valid (it matches nothing, so the
/// condition never fails).
pub fn validate_query(query: &Query) -> Result<(), ValidationError> {
    for item in &query.items {
        for event_type in &item.types {
            if event_type.is_empty() {
                return Err(ValidationError::new("query.types", "", "empty event type"));
            }
            if event_type.len() > MAX_TYPE_LEN {
                return Err(ValidationError::new(
                    "query.types",
                    event_type,
                    format!("event type exceeds {} chars", MAX_TYPE_LEN),
                ));
            }
        }
        for tag in &item.tags {
            if tag.key.is_empty() {
                return Err(ValidationError::new("query.tags", tag.encoded(), "empty tag key"));
            }
            if tag.value.is_empty() {
                return Err(ValidationError::new(
                    "query.tags",
                    tag.encoded(),
                    "empty tag value",
                ));
            }
        }
    }
    Ok(())
}

/// Validate a command before handing it to a handler.
pub fn validate_command(command: &Command) -> Result<(), ValidationError> {
    if command.command_type.is_empty() {
        return Err(ValidationError::new("type", "", "empty command type"));
    }
    if command.command_type.len() > MAX_TYPE_LEN {
        return Err(ValidationError::new(
            "type",
            &command.command_type,
            format!("command type exceeds {} chars", MAX_TYPE_LEN),
        ));
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
