//! SQLite storage bootstrap, schema migration and connection pooling.
//!
//! # Responsibility
//! - Open and configure SQLite connections for Bytebank core.
//! - Apply schema migrations in deterministic order.
//! - Hand out pooled connections with guaranteed release.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Core code must not read/write account data before migrations succeed.
//! - A pooled connection is returned to its pool on every exit path.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub mod migrations;
mod open;
mod pool;

pub use open::{open_db, open_db_in_memory};
pub use pool::{ConnectionPool, PooledConnection};

pub type DbResult<T> = Result<T, DbError>;

const DEFAULT_POOL_SIZE: usize = 4;
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// No pooled connection became free before the acquire timeout.
    PoolTimeout(Duration),
    /// The pool could not open its initial connections.
    Pool(r2d2::Error),
    InvalidConfig(String),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::PoolTimeout(waited) => write!(
                f,
                "no database connection available after {}ms",
                waited.as_millis()
            ),
            Self::Pool(err) => write!(f, "connection pool error: {err}"),
            Self::InvalidConfig(message) => write!(f, "invalid database config: {message}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
            Self::PoolTimeout(_) => None,
            Self::Pool(err) => Some(err),
            Self::InvalidConfig(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Storage settings used to build a [`ConnectionPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    /// Database file. `None` selects a private in-memory database.
    pub path: Option<PathBuf>,
    /// Number of pooled connections. In-memory pools always hold one.
    pub pool_size: usize,
    /// Upper bound for waiting on a free pooled connection.
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: None,
            pool_size: DEFAULT_POOL_SIZE,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }
}

impl DbConfig {
    /// Config for a file database with default pool settings.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }
}
