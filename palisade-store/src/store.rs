//! Store handle and lifecycle.
//!
//! [`EventStore`] is a cheap-to-clone handle over shared state (pool,
//! config, closed flag, projection semaphore). All clones observe `close`;
//! the projection semaphore is store-scoped, not process-scoped.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::info;

use crate::config::StoreConfig;
use crate::error::{EventStoreError, Result};
use crate::schema;

/// PostgreSQL-backed event store.
#[derive(Clone)]
pub struct EventStore {
    inner: Arc<Inner>,
}

struct Inner {
    pool: PgPool,
    config: StoreConfig,
    closed: AtomicBool,
    projection_permits: Arc<Semaphore>,
}

impl EventStore {
    /// Connect to the database and construct a verified store.
    pub async fn connect(database_url: &str, config: StoreConfig) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| EventStoreError::from_sqlx("Connect", e))?;
        Self::new(pool, config).await
    }

    /// Construct a store over an existing pool, verifying the events table
    /// has the contractual shape.
    pub async fn new(pool: PgPool, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        schema::verify_events_table(&pool, &config.events_table).await?;
        Self::new_unchecked(pool, config)
    }

    /// Construct a store without verifying the table structure.
    ///
    /// Use only when the schema is known-good (e.g., the same process just
    /// ran the migrations).
    pub fn new_unchecked(pool: PgPool, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let permits = config.max_concurrent_projections;
        Ok(Self {
            inner: Arc::new(Inner {
                pool,
                config,
                closed: AtomicBool::new(false),
                projection_permits: Arc::new(Semaphore::new(permits)),
            }),
        })
    }

    /// The store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// The underlying connection pool.
    pub(crate) fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Fail fast when the store has been closed.
    pub(crate) fn ensure_open(&self, operation: &'static str) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(EventStoreError::closed(operation));
        }
        Ok(())
    }

    /// Connectivity probe.
    pub async fn ping(&self) -> Result<()> {
        const OP: &str = "Ping";
        self.ensure_open(OP)?;
        with_timeout(OP, self.config().query_timeout, async {
            sqlx::query_scalar::<_, i32>("SELECT 1")
                .fetch_one(self.pool())
                .await
                .map_err(|e| EventStoreError::from_sqlx(OP, e))?;
            Ok(())
        })
        .await
    }

    /// Close the store. Idempotent and race-safe; after the first call every
    /// operation fails fast with a resource error.
    pub async fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            info!("Closing event store");
        }
        self.inner.pool.close().await;
    }

    /// Has `close` been called?
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Reserve a projection slot, failing fast when the store-wide cap is
    /// reached. The slot frees when the returned permit drops.
    pub fn try_acquire_projection_permit(&self) -> Result<OwnedSemaphorePermit> {
        self.ensure_open("Project")?;
        let max = self.inner.config.max_concurrent_projections;
        Arc::clone(&self.inner.projection_permits)
            .try_acquire_owned()
            .map_err(|_| EventStoreError::TooManyProjections {
                max_concurrent: max,
                current_count: max - self.inner.projection_permits.available_permits(),
            })
    }
}

impl std::fmt::Debug for EventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStore")
            .field("config", &self.inner.config)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Bound a store operation by a timeout; elapse surfaces as a resource
/// error carrying the operation label.
pub(crate) async fn with_timeout<T, F>(
    operation: &'static str,
    duration: Duration,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(EventStoreError::timeout(operation, duration.as_millis())),
    }
}
