//! Query compiler: multi-item queries + cursors → parameterized SQL.
//!
//! Items join by OR; within an item, types become `type = ANY($n)` and tags
//! become an array-containment check against the canonical tag encoding.
//! ORDER BY is always `(transaction_id, position)` ascending - ordering by
//! position alone would surface commits in commit order, not causal order.

use palisade_core::{AppendCondition, Cursor, Query};
use sqlx::postgres::PgArguments;
use sqlx::Arguments;

use crate::codec::encode_tags;

/// Columns every event read selects, in codec order.
pub(crate) const EVENT_COLUMNS: &str =
    "id, type, tags, data, transaction_id, position, occurred_at";

/// A bind value for a compiled statement, in positional order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Bind {
    /// `text[]` parameter (type lists, tag arrays).
    TextArray(Vec<String>),
    /// `bigint` parameter (cursor components).
    BigInt(i64),
}

/// A parameterized statement ready for binding.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CompiledQuery {
    pub sql: String,
    pub binds: Vec<Bind>,
}

/// Compile an ordered event scan for `query`, optionally resuming after a
/// cursor.
pub(crate) fn compile_select(
    table: &str,
    query: &Query,
    after: Option<Cursor>,
) -> CompiledQuery {
    let mut binds = Vec::new();
    let predicate = where_clause(query, after, &mut binds);
    let sql = format!(
        "SELECT {} FROM {} WHERE {} ORDER BY transaction_id ASC, position ASC",
        EVENT_COLUMNS, table, predicate
    );
    CompiledQuery { sql, binds }
}

/// Compile the single existence probe an append condition runs inside the
/// insert transaction.
pub(crate) fn compile_exists(table: &str, condition: &AppendCondition) -> CompiledQuery {
    let mut binds = Vec::new();
    let predicate = where_clause(&condition.query, condition.after, &mut binds);
    let sql = format!("SELECT 1 FROM {} WHERE {} LIMIT 1", table, predicate);
    CompiledQuery { sql, binds }
}

/// Build the WHERE predicate, pushing binds in positional order.
fn where_clause(query: &Query, after: Option<Cursor>, binds: &mut Vec<Bind>) -> String {
    // Empty query: zero rows, table untouched by the planner.
    if query.is_empty() {
        return "FALSE".to_string();
    }

    let mut item_clauses = Vec::with_capacity(query.items.len());
    for item in &query.items {
        let mut conjuncts = Vec::new();
        if !item.types.is_empty() {
            binds.push(Bind::TextArray(item.types.clone()));
            conjuncts.push(format!("type = ANY(${})", binds.len()));
        }
        if !item.tags.is_empty() {
            binds.push(Bind::TextArray(encode_tags(&item.tags)));
            conjuncts.push(format!("tags @> ${}", binds.len()));
        }
        // Empty types and tags: the item matches everything.
        item_clauses.push(match conjuncts.len() {
            0 => "TRUE".to_string(),
            1 => conjuncts.remove(0),
            _ => format!("({})", conjuncts.join(" AND ")),
        });
    }

    let matched = if item_clauses.len() == 1 {
        item_clauses.remove(0)
    } else {
        format!("({})", item_clauses.join(" OR "))
    };

    match after {
        Some(cursor) => {
            binds.push(Bind::BigInt(cursor.transaction_id));
            let txid_param = binds.len();
            binds.push(Bind::BigInt(cursor.position));
            let pos_param = binds.len();
            format!(
                "{} AND (transaction_id > ${} OR (transaction_id = ${} AND position > ${}))",
                matched, txid_param, txid_param, pos_param
            )
        }
        None => matched,
    }
}

/// Materialize a bind list as driver arguments, in positional order.
pub(crate) fn bind_arguments(binds: &[Bind]) -> Result<PgArguments, sqlx::Error> {
    let mut args = PgArguments::default();
    for bind in binds {
        let pushed = match bind {
            Bind::TextArray(values) => args.add(values),
            Bind::BigInt(n) => args.add(n),
        };
        pushed.map_err(sqlx::Error::Encode)?;
    }
    Ok(args)
}

// =============================================================================
// Tests
// =============================================================================
