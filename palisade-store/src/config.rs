//! Store configuration.
//!
//! Loads from `PALISADE_*` environment variables with sensible defaults,
//! except for the projection limits which are always explicit: there is no
//! hidden default for how much concurrent projection work a deployment
//! tolerates.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default events table name.
pub const DEFAULT_EVENTS_TABLE: &str = "events";
/// Default maximum events per append batch.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 1000;
/// Default stream channel capacity.
pub const DEFAULT_STREAM_BUFFER: usize = 1000;
/// Default query timeout.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_millis(10_000);
/// Default append timeout.
pub const DEFAULT_APPEND_TIMEOUT: Duration = Duration::from_millis(10_000);
/// Default advisory-lock wait timeout.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("config: {0}")]
pub struct ConfigError(pub String);

/// Is `name` usable as an events table identifier?
///
/// Table names are interpolated into SQL, so only ASCII identifier
/// characters are accepted. Shared with the administrative tooling that
/// targets the same table.
pub fn valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(first) if first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// =============================================================================
// IsolationLevel
// =============================================================================

/// Transaction isolation for append operations.
///
/// Under `ReadCommitted` the DCB guarantee relies on the advisory-lock
/// discipline callers opt into; `RepeatableRead` and `Serializable` let the
/// database serialize conflicting appends itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// PostgreSQL READ COMMITTED (default).
    #[default]
    ReadCommitted,
    /// PostgreSQL REPEATABLE READ.
    RepeatableRead,
    /// PostgreSQL SERIALIZABLE.
    Serializable,
}

impl IsolationLevel {
    /// SQL fragment for `SET TRANSACTION ISOLATION LEVEL`.
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl FromStr for IsolationLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "read_committed" => Ok(IsolationLevel::ReadCommitted),
            "repeatable_read" => Ok(IsolationLevel::RepeatableRead),
            "serializable" => Ok(IsolationLevel::Serializable),
            other => Err(ConfigError(format!(
                "invalid isolation level: {}. Expected: read_committed, repeatable_read, serializable",
                other
            ))),
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsolationLevel::ReadCommitted => write!(f, "read_committed"),
            IsolationLevel::RepeatableRead => write!(f, "repeatable_read"),
            IsolationLevel::Serializable => write!(f, "serializable"),
        }
    }
}

// =============================================================================
// StoreConfig
// =============================================================================

/// Event store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Target events table name.
    pub events_table: String,
    /// Maximum events per append batch.
    pub max_batch_size: usize,
    /// Capacity of stream channels; the producer blocks on a full buffer.
    pub stream_buffer: usize,
    /// Isolation level for append transactions.
    pub append_isolation: IsolationLevel,
    /// Upper bound on a query round-trip.
    pub query_timeout: Duration,
    /// Upper bound on an append transaction.
    pub append_timeout: Duration,
    /// How long an append may wait for an advisory lock.
    pub lock_timeout: Duration,
    /// Active-projection cap for this store instance. Required, no default.
    pub max_concurrent_projections: usize,
    /// Per-projection fan-out cap (projectors per call). Required, no default.
    pub max_projection_tasks: usize,
}

impl StoreConfig {
    /// Create a config with explicit projection limits and defaults for
    /// everything else.
    pub fn new(max_concurrent_projections: usize, max_projection_tasks: usize) -> Self {
        Self {
            events_table: DEFAULT_EVENTS_TABLE.to_string(),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            stream_buffer: DEFAULT_STREAM_BUFFER,
            append_isolation: IsolationLevel::default(),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            append_timeout: DEFAULT_APPEND_TIMEOUT,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            max_concurrent_projections,
            max_projection_tasks,
        }
    }

    /// Load configuration from `PALISADE_*` environment variables.
    ///
    /// `.env` files are honored. `PALISADE_MAX_CONCURRENT_PROJECTIONS` and
    /// `PALISADE_MAX_PROJECTION_TASKS` are required; everything else falls
    /// back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let max_concurrent_projections = require_usize("PALISADE_MAX_CONCURRENT_PROJECTIONS")?;
        let max_projection_tasks = require_usize("PALISADE_MAX_PROJECTION_TASKS")?;

        let mut config = Self::new(max_concurrent_projections, max_projection_tasks);

        if let Ok(table) = env::var("PALISADE_EVENTS_TABLE") {
            config.events_table = table;
        }
        if let Some(n) = optional_usize("PALISADE_MAX_BATCH_SIZE")? {
            config.max_batch_size = n;
        }
        if let Some(n) = optional_usize("PALISADE_STREAM_BUFFER")? {
            config.stream_buffer = n;
        }
        if let Ok(iso) = env::var("PALISADE_APPEND_ISOLATION") {
            config.append_isolation = iso.parse()?;
        }
        if let Some(ms) = optional_usize("PALISADE_QUERY_TIMEOUT_MS")? {
            config.query_timeout = Duration::from_millis(ms as u64);
        }
        if let Some(ms) = optional_usize("PALISADE_APPEND_TIMEOUT_MS")? {
            config.append_timeout = Duration::from_millis(ms as u64);
        }
        if let Some(ms) = optional_usize("PALISADE_LOCK_TIMEOUT_MS")? {
            config.lock_timeout = Duration::from_millis(ms as u64);
        }

        config.validate()?;
        Ok(config)
    }

    /// Create test configuration: tight limits, short timeouts.
    pub fn test() -> Self {
        let mut config = Self::new(8, 8);
        config.query_timeout = Duration::from_millis(5_000);
        config.append_timeout = Duration::from_millis(5_000);
        config.lock_timeout = Duration::from_millis(1_000);
        config
    }

    /// Set the events table name (builder style).
    pub fn with_events_table(mut self, table: impl Into<String>) -> Self {
        self.events_table = table.into();
        self
    }

    /// Set the append isolation level (builder style).
    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.append_isolation = isolation;
        self
    }

    /// Set the maximum batch size (builder style).
    pub fn with_max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = max;
        self
    }

    /// Set the stream buffer capacity (builder style).
    pub fn with_stream_buffer(mut self, capacity: usize) -> Self {
        self.stream_buffer = capacity;
        self
    }

    /// Check the configuration is internally consistent.
    ///
    /// The table name is interpolated into SQL, so it is restricted to
    /// identifier characters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.events_table.is_empty() {
            return Err(ConfigError("events table name must not be empty".to_string()));
        }
        if !valid_table_name(&self.events_table) {
            return Err(ConfigError(format!(
                "invalid events table name: {}",
                self.events_table
            )));
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError("max_batch_size must be positive".to_string()));
        }
        if self.stream_buffer == 0 {
            return Err(ConfigError("stream_buffer must be positive".to_string()));
        }
        if self.max_concurrent_projections == 0 {
            return Err(ConfigError("max_concurrent_projections must be positive".to_string()));
        }
        if self.max_projection_tasks == 0 {
            return Err(ConfigError("max_projection_tasks must be positive".to_string()));
        }
        Ok(())
    }
}

fn require_usize(key: &str) -> Result<usize, ConfigError> {
    let raw = env::var(key).map_err(|_| ConfigError(format!("{} is required", key)))?;
    raw.parse::<usize>()
        .map_err(|_| ConfigError(format!("invalid {} value: {}", key, raw)))
}

fn optional_usize(key: &str) -> Result<Option<usize>, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<usize>()
            .map(Some)
            .map_err(|_| ConfigError(format!("invalid {} value: {}", key, raw))),
        Err(_) => Ok(None),
    }
}

// =============================================================================
// Tests
// =============================================================================
