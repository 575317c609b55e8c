//! Environment-driven core configuration.
//!
//! # Responsibility
//! - Collect storage, service and logging settings in one value.
//! - Parse `BYTEBANK_*` environment variables with explicit errors.
//!
//! # Invariants
//! - Unset or blank variables fall back to defaults.
//! - Present but malformed variables are rejected, never ignored.

use crate::db::DbConfig;
use crate::logging::{default_log_level, normalize_level, normalize_log_dir};
use crate::service::account_service::AccountServiceConfig;
use std::env;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_DB_PATH: &str = "BYTEBANK_DB_PATH";
pub const ENV_POOL_SIZE: &str = "BYTEBANK_POOL_SIZE";
pub const ENV_ACQUIRE_TIMEOUT_MS: &str = "BYTEBANK_ACQUIRE_TIMEOUT_MS";
pub const ENV_MAX_BALANCE_RETRIES: &str = "BYTEBANK_MAX_BALANCE_RETRIES";
pub const ENV_LOG_LEVEL: &str = "BYTEBANK_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "BYTEBANK_LOG_DIR";

const MAX_POOL_SIZE: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue { key: &'static str, value: String },
    OutOfRange { key: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { key, value } => write!(f, "invalid value `{value}` for {key}"),
            Self::OutOfRange { key, value } => write!(f, "value `{value}` for {key} is out of range"),
        }
    }
}

impl Error for ConfigError {}

/// Full configuration for one core instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub db: DbConfig,
    pub service: AccountServiceConfig,
    pub log_level: String,
    /// Rolling log directory; logging stays off when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            db: DbConfig::default(),
            service: AccountServiceConfig::default(),
            log_level: default_log_level().to_string(),
            log_dir: None,
        }
    }
}

impl CoreConfig {
    /// Builds configuration from the process environment.
    ///
    /// # Environment Variables
    /// - `BYTEBANK_DB_PATH`: database file; unset means in-memory.
    /// - `BYTEBANK_POOL_SIZE`: pooled connections, 1..=64.
    /// - `BYTEBANK_ACQUIRE_TIMEOUT_MS`: pool acquire timeout, above zero.
    /// - `BYTEBANK_MAX_BALANCE_RETRIES`: optimistic retry limit.
    /// - `BYTEBANK_LOG_LEVEL`: trace|debug|info|warn|error.
    /// - `BYTEBANK_LOG_DIR`: absolute directory for rolling log files.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();

        if let Some(path) = read(ENV_DB_PATH) {
            config.db.path = Some(PathBuf::from(path));
        }

        if let Some(raw) = read(ENV_POOL_SIZE) {
            let size: usize = parse_value(ENV_POOL_SIZE, &raw)?;
            if size == 0 || size > MAX_POOL_SIZE {
                return Err(ConfigError::OutOfRange {
                    key: ENV_POOL_SIZE,
                    value: raw,
                });
            }
            config.db.pool_size = size;
        }

        if let Some(raw) = read(ENV_ACQUIRE_TIMEOUT_MS) {
            let millis: u64 = parse_value(ENV_ACQUIRE_TIMEOUT_MS, &raw)?;
            if millis == 0 {
                return Err(ConfigError::OutOfRange {
                    key: ENV_ACQUIRE_TIMEOUT_MS,
                    value: raw,
                });
            }
            config.db.acquire_timeout = Duration::from_millis(millis);
        }

        if let Some(raw) = read(ENV_MAX_BALANCE_RETRIES) {
            config.service.max_balance_retries = parse_value(ENV_MAX_BALANCE_RETRIES, &raw)?;
        }

        if let Some(raw) = read(ENV_LOG_LEVEL) {
            let level = normalize_level(&raw).map_err(|_| ConfigError::InvalidValue {
                key: ENV_LOG_LEVEL,
                value: raw.clone(),
            })?;
            config.log_level = level.to_string();
        }

        if let Some(raw) = read(ENV_LOG_DIR) {
            let dir = normalize_log_dir(&raw).map_err(|_| ConfigError::InvalidValue {
                key: ENV_LOG_DIR,
                value: raw.clone(),
            })?;
            config.log_dir = Some(dir);
        }

        Ok(config)
    }
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}
