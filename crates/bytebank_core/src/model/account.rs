//! Account, customer and account-opening records.
//!
//! # Invariants
//! - `number` is stable and never reused for another account.
//! - `balance` is an exact decimal and never negative.
//! - `Customer` fields are trimmed and non-empty once constructed.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Unique account identifier.
pub type AccountNumber = i64;

/// Validation failure for customer registration data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomerValidationError {
    EmptyName,
    EmptyTaxId,
    InvalidEmail(String),
}

impl Display for CustomerValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "customer name cannot be empty"),
            Self::EmptyTaxId => write!(f, "customer tax id cannot be empty"),
            Self::InvalidEmail(value) => write!(f, "invalid customer email `{value}`"),
        }
    }
}

impl Error for CustomerValidationError {}

/// Account owner registration data. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CustomerFields")]
pub struct Customer {
    name: String,
    tax_id: String,
    email: String,
}

impl Customer {
    /// Builds a customer from raw registration fields.
    ///
    /// # Errors
    /// - Empty (after trim) name or tax id.
    /// - Email without a non-empty local part and domain around `@`.
    pub fn new(
        name: impl Into<String>,
        tax_id: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<Self, CustomerValidationError> {
        let name = name.into().trim().to_string();
        let tax_id = tax_id.into().trim().to_string();
        let email = email.into().trim().to_string();

        if name.is_empty() {
            return Err(CustomerValidationError::EmptyName);
        }
        if tax_id.is_empty() {
            return Err(CustomerValidationError::EmptyTaxId);
        }
        if !is_plausible_email(&email) {
            return Err(CustomerValidationError::InvalidEmail(email));
        }

        Ok(Self {
            name,
            tax_id,
            email,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tax_id(&self) -> &str {
        &self.tax_id
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

// Deserialization goes through `Customer::new` so invalid input never
// produces a `Customer`.
#[derive(Deserialize)]
struct CustomerFields {
    name: String,
    tax_id: String,
    email: String,
}

impl TryFrom<CustomerFields> for Customer {
    type Error = CustomerValidationError;

    fn try_from(value: CustomerFields) -> Result<Self, Self::Error> {
        Self::new(value.name, value.tax_id, value.email)
    }
}

fn is_plausible_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

/// Input for opening a new account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAccountRequest {
    pub number: AccountNumber,
    pub customer: Customer,
}

impl OpenAccountRequest {
    pub fn new(number: AccountNumber, customer: Customer) -> Self {
        Self { number, customer }
    }
}

/// Persisted account as read from storage.
///
/// A fetched value is a snapshot; the stored balance may move after it was
/// read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub number: AccountNumber,
    pub balance: Decimal,
    pub owner: Customer,
    pub active: bool,
}

impl Account {
    /// Creates the initial state of a freshly opened account.
    pub fn opened(request: OpenAccountRequest) -> Self {
        Self {
            number: request.number,
            balance: Decimal::ZERO,
            owner: request.customer,
            active: true,
        }
    }

    /// Returns whether any funds remain on the account.
    pub fn has_balance(&self) -> bool {
        !self.balance.is_zero()
    }
}
