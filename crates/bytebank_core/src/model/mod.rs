//! Account domain model.
//!
//! # Responsibility
//! - Define the records shared by the account store and service.
//! - Validate customer registration data at construction time.
//!
//! # Invariants
//! - Every account is identified by a stable `AccountNumber`.
//! - Closure is represented by the `active` flag, not hard delete.

pub mod account;
