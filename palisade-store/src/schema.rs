//! Events table structure verification.
//!
//! Run at store construction: the append and query engines interpolate the
//! table name and assume the contractual column set, so a drifted schema
//! must fail loudly up front rather than corrupt at first use.

use sqlx::PgPool;
use tracing::debug;

use crate::error::{EventStoreError, Result, TableStructureError};

/// Contractual columns and their `information_schema.columns.data_type`
/// spellings.
const EXPECTED_COLUMNS: &[(&str, &str)] = &[
    ("id", "uuid"),
    ("type", "text"),
    ("tags", "ARRAY"),
    ("data", "jsonb"),
    ("transaction_id", "bigint"),
    ("position", "bigint"),
    ("occurred_at", "timestamp with time zone"),
];

/// Verify the events table exists and every contractual column has the
/// expected type.
pub(crate) async fn verify_events_table(pool: &PgPool, table: &str) -> Result<()> {
    const OP: &str = "VerifyTableStructure";

    let columns: Vec<(String, String)> = sqlx::query_as(
        "SELECT column_name, data_type FROM information_schema.columns \
         WHERE table_schema = current_schema() AND table_name = $1",
    )
    .bind(table)
    .fetch_all(pool)
    .await
    .map_err(|e| EventStoreError::from_sqlx(OP, e))?;

    if columns.is_empty() {
        return Err(TableStructureError {
            table_name: table.to_string(),
            column_name: String::new(),
            expected_type: String::new(),
            actual_type: String::new(),
            issue: "table not found".to_string(),
        }
        .into());
    }

    for (name, expected) in EXPECTED_COLUMNS {
        match columns.iter().find(|(col, _)| col == name) {
            None => {
                return Err(TableStructureError {
                    table_name: table.to_string(),
                    column_name: name.to_string(),
                    expected_type: expected.to_string(),
                    actual_type: String::new(),
                    issue: "missing column".to_string(),
                }
                .into());
            }
            Some((_, actual)) if actual != expected => {
                return Err(TableStructureError {
                    table_name: table.to_string(),
                    column_name: name.to_string(),
                    expected_type: expected.to_string(),
                    actual_type: actual.clone(),
                    issue: "unexpected type".to_string(),
                }
                .into());
            }
            Some(_) => {}
        }
    }

    debug!(table, "Events table structure verified");
    Ok(())
}
