//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define data access contracts for account records.
//! - Isolate SQLite query details from service/business orchestration.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`, `BalanceConflict`)
//!   in addition to DB transport errors.

pub mod account_repo;
