//! Shared pool of migrated SQLite connections.
//!
//! # Responsibility
//! - Wrap an `r2d2` pool so every lent connection is bootstrapped and
//!   migrated.
//! - Map pool failures onto [`DbError`].
//!
//! # Invariants
//! - A [`PooledConnection`] returns its connection to the pool when dropped,
//!   including on early-return and unwind paths.
//! - In-memory pools hold exactly one long-lived connection; a second
//!   connection would see a different database.

use super::open::{bootstrap_connection, open_db};
use super::{DbConfig, DbError, DbResult};
use log::{debug, warn};
use r2d2_sqlite::SqliteConnectionManager;
use std::sync::Arc;
use std::time::Duration;

const MAX_POOL_SIZE: usize = 64;

/// Scoped loan of one pooled connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Shared handle to a set of SQLite connections.
///
/// Cloning is cheap; clones lend from the same pool.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<r2d2::Pool<SqliteConnectionManager>>,
    acquire_timeout: Duration,
}

impl ConnectionPool {
    /// Opens a pool according to `config`.
    ///
    /// # Errors
    /// - `DbError::InvalidConfig` when `pool_size` is outside 1..=64 or the
    ///   acquire timeout is zero.
    /// - Any bootstrap/migration error from opening the database.
    pub fn open(config: &DbConfig) -> DbResult<Self> {
        if config.pool_size == 0 || config.pool_size > MAX_POOL_SIZE {
            return Err(DbError::InvalidConfig(format!(
                "pool_size must be within 1..={MAX_POOL_SIZE}, got {}",
                config.pool_size
            )));
        }
        if config.acquire_timeout.is_zero() {
            return Err(DbError::InvalidConfig(
                "acquire_timeout must be greater than zero".to_string(),
            ));
        }

        let (manager, size, wal) = match config.path.as_ref() {
            Some(path) => {
                // Surfaces schema errors with their own variant before the
                // pool starts opening members.
                drop(open_db(path)?);
                (SqliteConnectionManager::file(path), config.pool_size, true)
            }
            None => (SqliteConnectionManager::memory(), 1, false),
        };
        let manager = manager.with_init(move |conn| {
            bootstrap_connection(conn, wal).map_err(into_sqlite_error)
        });

        let pool = r2d2::Pool::builder()
            .max_size(size as u32)
            .connection_timeout(config.acquire_timeout)
            .max_lifetime(None)
            .idle_timeout(None)
            .build(manager)
            .map_err(DbError::Pool)?;

        debug!("event=pool_open module=db status=ok size={size}");
        Ok(Self {
            inner: Arc::new(pool),
            acquire_timeout: config.acquire_timeout,
        })
    }

    /// Opens a single-connection in-memory pool with default timeouts.
    pub fn in_memory() -> DbResult<Self> {
        Self::open(&DbConfig::in_memory())
    }

    /// Borrows a connection, blocking until one is free.
    ///
    /// # Errors
    /// - `DbError::PoolTimeout` when no connection is returned within the
    ///   configured acquire timeout.
    pub fn get(&self) -> DbResult<PooledConnection> {
        self.inner.get().map_err(|err| {
            warn!(
                "event=pool_acquire module=db status=error error_code=pool_timeout size={} error={}",
                self.size(),
                err
            );
            DbError::PoolTimeout(self.acquire_timeout)
        })
    }

    /// Total number of connections the pool may hold.
    pub fn size(&self) -> usize {
        self.inner.max_size() as usize
    }

    /// Number of connections currently waiting to be lent.
    pub fn idle_count(&self) -> usize {
        self.inner.state().idle_connections as usize
    }
}

// The manager's init hook only speaks `rusqlite::Error`.
fn into_sqlite_error(err: DbError) -> rusqlite::Error {
    match err {
        DbError::Sqlite(err) => err,
        other => rusqlite::Error::UserFunctionError(Box::new(other)),
    }
}
