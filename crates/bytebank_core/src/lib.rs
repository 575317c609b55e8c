//! Core account management for Bytebank.
//! This crate is the single source of truth for account business invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, CoreConfig};
pub use db::{ConnectionPool, DbConfig, DbError};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::account::{
    Account, AccountNumber, Customer, CustomerValidationError, OpenAccountRequest,
};
pub use repo::account_repo::{
    AccountRepository, BalanceChange, SqliteAccountRepository, StoreError, StoreResult,
};
pub use service::account_service::{
    AccountService, AccountServiceConfig, BusinessRuleError, ServiceError, ServiceResult,
};

/// Opens the configured store and wires a ready-to-use account service.
pub fn open_account_service(
    config: &CoreConfig,
) -> Result<AccountService<SqliteAccountRepository>, DbError> {
    let pool = ConnectionPool::open(&config.db)?;
    let repo = SqliteAccountRepository::new(pool);
    Ok(AccountService::with_config(repo, config.service))
}

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
