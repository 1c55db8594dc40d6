//! Database lifecycle for Palisade.
//!
//! Embeds the workspace migrations and exposes the between-runs operations
//! a deployment needs: bring the schema up to date, inspect applied versus
//! pending migrations, and administratively truncate the events table.
//! Connectivity probing is [`EventStore::ping`](palisade_store::EventStore)'s
//! job; nothing here runs at store runtime.

use sqlx::migrate::{MigrationType, Migrator};
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};

/// Workspace migrations, embedded at compile time.
pub static MIGRATOR: Migrator = sqlx::migrate!("../migrations");

/// Errors from lifecycle operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// Running migrations failed.
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Refused to touch a table whose name is not a plain identifier.
    #[error("invalid table name: {0}")]
    InvalidTable(String),

    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for DB lifecycle operations.
pub type Result<T> = std::result::Result<T, DbError>;

/// A migration the database records as applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    /// Migration version.
    pub version: i64,
    /// Migration description.
    pub description: String,
    /// Whether it ran to completion.
    pub success: bool,
}

/// Migration state of a database relative to the embedded migrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Migrations the database has applied, oldest first.
    pub applied: Vec<AppliedMigration>,
    /// Versions the migrator carries that the database has not applied.
    pub pending: Vec<i64>,
}

impl MigrationStatus {
    /// Nothing pending, nothing half-applied.
    pub fn is_current(&self) -> bool {
        self.pending.is_empty() && self.applied.iter().all(|m| m.success)
    }
}

/// Bring the schema up to date. Idempotent.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    MIGRATOR.run(pool).await?;
    info!("Database migrations up to date");
    Ok(())
}

/// Report applied and pending migrations.
///
/// A database that has never been migrated (no `_sqlx_migrations` table)
/// reports every known version as pending.
pub async fn status(pool: &PgPool) -> Result<MigrationStatus> {
    let rows: Vec<(i64, String, bool)> = match sqlx::query_as(
        "SELECT version, description, success FROM _sqlx_migrations ORDER BY version",
    )
    .fetch_all(pool)
    .await
    {
        Ok(rows) => rows,
        // 42P01 undefined_table: nothing has ever been migrated.
        Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some("42P01") => Vec::new(),
        Err(e) => return Err(e.into()),
    };

    let applied: Vec<AppliedMigration> = rows
        .into_iter()
        .map(|(version, description, success)| AppliedMigration {
            version,
            description,
            success,
        })
        .collect();

    let known: Vec<i64> = MIGRATOR
        .migrations
        .iter()
        .filter(|m| !matches!(m.migration_type, MigrationType::ReversibleDown))
        .map(|m| m.version)
        .collect();

    Ok(MigrationStatus { pending: pending_versions(&known, &applied), applied })
}

/// Administratively truncate the events table.
///
/// Events are otherwise append-only: never updated, never deleted. This
/// resets the position sequence too, so it is strictly a between-runs
/// operation (test teardown, environment resets), never a runtime one.
pub async fn truncate_events(pool: &PgPool, table: &str) -> Result<()> {
    if !palisade_store::valid_table_name(table) {
        return Err(DbError::InvalidTable(table.to_string()));
    }

    warn!(table, "Truncating events table");
    sqlx::query(&format!("TRUNCATE {} RESTART IDENTITY", table)).execute(pool).await?;
    Ok(())
}

fn pending_versions(known: &[i64], applied: &[AppliedMigration]) -> Vec<i64> {
    known
        .iter()
        .copied()
        .filter(|version| !applied.iter().any(|a| a.version == *version))
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn applied(version: i64, success: bool) -> AppliedMigration {
        AppliedMigration { version, description: format!("m{}", version), success }
    }

    #[test]
    fn test_pending_versions() {
        assert_eq!(pending_versions(&[1, 2, 3], &[applied(1, true)]), vec![2, 3]);
        assert_eq!(pending_versions(&[1], &[]), vec![1]);
        assert!(pending_versions(&[1], &[applied(1, true)]).is_empty());
        assert!(pending_versions(&[], &[]).is_empty());
    }

    #[test]
    fn test_is_current() {
        let current = MigrationStatus { applied: vec![applied(1, true)], pending: vec![] };
        assert!(current.is_current());

        let pending = MigrationStatus { applied: vec![applied(1, true)], pending: vec![2] };
        assert!(!pending.is_current());

        let half_applied = MigrationStatus { applied: vec![applied(1, false)], pending: vec![] };
        assert!(!half_applied.is_current());
    }

    #[test]
    fn test_migrator_embeds_the_schema_migration() {
        assert!(MIGRATOR.migrations.iter().any(|m| m.version == 1));
    }
}
