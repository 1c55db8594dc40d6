//! Queries, cursors, and append conditions.
//!
//! A [`Query`] is a disjunction of [`QueryItem`]s. An event matches an item
//! when its type is in the item's type list (or the list is empty) and its
//! tags contain every tag the item requires. An event matches the query
//! when it matches any item.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::event::{Event, Tag};

// =============================================================================
// QueryItem
// =============================================================================

/// One conjunct of a query: types OR'd internally, tags AND'd (containment).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryItem {
    /// Accepted event types. Empty = any type.
    pub types: Vec<String>,
    /// Required tags. Empty = any tags.
    pub tags: Vec<Tag>,
}

impl QueryItem {
    /// Create a query item.
    pub fn new<T: Into<String>>(types: Vec<T>, tags: Vec<Tag>) -> Self {
        Self { types: types.into_iter().map(Into::into).collect(), tags }
    }

    /// Item matching every event (empty types, empty tags).
    pub fn match_all() -> Self {
        Self { types: Vec::new(), tags: Vec::new() }
    }

    /// Does the event satisfy this item?
    pub fn matches(&self, event: &Event) -> bool {
        let type_ok =
            self.types.is_empty() || self.types.iter().any(|t| t == &event.event_type);
        let tags_ok = self.tags.iter().all(|required| event.has_tag(required));
        type_ok && tags_ok
    }
}

// =============================================================================
// Query
// =============================================================================

/// A disjunction of query items.
///
/// The empty query matches nothing; a query containing a single
/// [`QueryItem::match_all`] item matches everything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Items joined by OR.
    pub items: Vec<QueryItem>,
}

impl Query {
    /// Query matching nothing.
    pub fn empty() -> Self {
        Self { items: Vec::new() }
    }

    /// Query matching every event.
    pub fn all() -> Self {
        Self { items: vec![QueryItem::match_all()] }
    }

    /// Query from a list of items.
    pub fn from_items(items: Vec<QueryItem>) -> Self {
        Self { items }
    }

    /// Single-item query.
    pub fn single<T: Into<String>>(types: Vec<T>, tags: Vec<Tag>) -> Self {
        Self { items: vec![QueryItem::new(types, tags)] }
    }

    /// True when the query has no items (matches nothing).
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Does the event match any item?
    pub fn matches(&self, event: &Event) -> bool {
        self.items.iter().any(|item| item.matches(event))
    }

    /// Union of two queries, deduplicating identical items.
    pub fn union(&self, other: &Query) -> Query {
        let mut items = self.items.clone();
        for item in &other.items {
            if !items.contains(item) {
                items.push(item.clone());
            }
        }
        Query { items }
    }
}

// =============================================================================
// Cursor
// =============================================================================

/// A `(transaction_id, position)` resume point.
///
/// Events after the cursor are those with `txid > cursor.txid`, or
/// `txid = cursor.txid` and `position > cursor.position`. Gap-tolerant:
/// missing positions (rolled-back transactions) never stall a reader.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Cursor {
    /// Transaction id component (compares first).
    pub transaction_id: i64,
    /// Position component (tie-breaker within a transaction).
    pub position: i64,
}

impl Cursor {
    /// Create a cursor.
    pub fn new(transaction_id: i64, position: i64) -> Self {
        Self { transaction_id, position }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.transaction_id, self.position)
    }
}

// =============================================================================
// AppendCondition
// =============================================================================

/// The consistency boundary of a conditional append.
///
/// Semantics: fail the append if any event matching `query` exists after
/// `after`. A condition whose query is empty never fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendCondition {
    /// Events whose appearance invalidates the caller's decision.
    pub query: Query,
    /// Decision point. `None` = start of time (any matching event fails).
    pub after: Option<Cursor>,
}

impl AppendCondition {
    /// Fail if any event matching `query` exists at all.
    pub fn fail_if_exists(query: Query) -> Self {
        Self { query, after: None }
    }

    /// Fail if any event matching `query` exists after `cursor`.
    pub fn after(query: Query, cursor: Cursor) -> Self {
        Self { query, after: Some(cursor) }
    }
}

// =============================================================================
// Tests
// =============================================================================
