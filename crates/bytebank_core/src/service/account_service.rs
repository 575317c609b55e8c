//! Account use-case service.
//!
//! # Responsibility
//! - Enforce account business rules before touching storage.
//! - Translate raw lookups into domain errors.
//! - Sequence balance mutations, including atomic transfers.
//!
//! # Invariants
//! - Balances written through this service are never negative.
//! - Closed accounts are never mutated.
//! - Business rule errors and store errors stay distinct; the only
//!   translation is a mutation-time `StoreError::NotFound`, which means the
//!   account was closed concurrently and surfaces as `AccountNotFound`.
//! - `transfer` is the only operation that turns business errors into a
//!   boolean result.

use crate::model::account::{Account, AccountNumber, OpenAccountRequest};
use crate::repo::account_repo::{AccountRepository, BalanceChange, StoreError};
use log::{info, warn};
use rust_decimal::Decimal;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

const DEFAULT_MAX_BALANCE_RETRIES: u32 = 8;

/// Expected, caller-correctable rule violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusinessRuleError {
    InvalidAmount,
    InsufficientBalance,
    AccountNotFound(AccountNumber),
    AccountStillFunded,
    SameAccountTransfer,
    /// Crediting the amount would exceed the largest representable balance.
    BalanceOverflow,
}

impl Display for BusinessRuleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAmount => write!(f, "amount must exceed zero"),
            Self::InsufficientBalance => write!(f, "insufficient balance"),
            Self::AccountNotFound(_) => write!(f, "no account with that number"),
            Self::AccountStillFunded => write!(f, "account still has balance"),
            Self::SameAccountTransfer => write!(f, "source and destination must differ"),
            Self::BalanceOverflow => write!(f, "resulting balance is too large"),
        }
    }
}

impl Error for BusinessRuleError {}

/// Service error for account use-cases.
#[derive(Debug)]
pub enum ServiceError {
    BusinessRule(BusinessRuleError),
    Store(StoreError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BusinessRule(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::BusinessRule(err) => Some(err),
            Self::Store(err) => Some(err),
        }
    }
}

impl From<BusinessRuleError> for ServiceError {
    fn from(value: BusinessRuleError) -> Self {
        Self::BusinessRule(value)
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl ServiceError {
    /// Returns the rule violation when this is a business error.
    pub fn business_rule(&self) -> Option<&BusinessRuleError> {
        match self {
            Self::BusinessRule(err) => Some(err),
            Self::Store(_) => None,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Tuning knobs for [`AccountService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountServiceConfig {
    /// Re-read attempts after a concurrent balance change, per operation.
    pub max_balance_retries: u32,
}

impl Default for AccountServiceConfig {
    fn default() -> Self {
        Self {
            max_balance_retries: DEFAULT_MAX_BALANCE_RETRIES,
        }
    }
}

/// Account service facade over repository implementations.
pub struct AccountService<R: AccountRepository> {
    repo: R,
    config: AccountServiceConfig,
}

impl<R: AccountRepository> AccountService<R> {
    /// Creates a service with default configuration.
    pub fn new(repo: R) -> Self {
        Self::with_config(repo, AccountServiceConfig::default())
    }

    pub fn with_config(repo: R, config: AccountServiceConfig) -> Self {
        Self { repo, config }
    }

    /// Lists every open account.
    pub fn list_open_accounts(&self) -> ServiceResult<Vec<Account>> {
        Ok(self.repo.list_active()?)
    }

    /// Returns the current balance of an open account.
    pub fn get_balance(&self, number: AccountNumber) -> ServiceResult<Decimal> {
        Ok(self.get_by_number(number)?.balance)
    }

    /// Opens a new account with zero balance.
    ///
    /// Duplicate numbers surface as store errors.
    pub fn open(&self, request: &OpenAccountRequest) -> ServiceResult<()> {
        match self.repo.open(request) {
            Ok(()) => {
                info!(
                    "event=account_open module=service status=ok number={}",
                    request.number
                );
                Ok(())
            }
            Err(err) => {
                warn!(
                    "event=account_open module=service status=error number={} error={}",
                    request.number, err
                );
                Err(err.into())
            }
        }
    }

    /// Withdraws `amount` from an open account.
    ///
    /// # Errors
    /// - `InvalidAmount` when `amount <= 0`.
    /// - `AccountNotFound` when the account is absent or closed.
    /// - `InsufficientBalance` when `amount` exceeds the balance.
    pub fn withdraw(&self, number: AccountNumber, amount: Decimal) -> ServiceResult<()> {
        ensure_positive(amount)?;

        let new_balance = self.mutate_balance(number, |balance| {
            if amount > balance {
                return Err(BusinessRuleError::InsufficientBalance);
            }
            Ok(balance - amount)
        })?;

        info!(
            "event=account_withdraw module=service status=ok number={number} balance={new_balance}"
        );
        Ok(())
    }

    /// Deposits `amount` into an open account.
    ///
    /// # Errors
    /// - `InvalidAmount` when `amount <= 0`.
    /// - `AccountNotFound` when the account is absent or closed.
    /// - `BalanceOverflow` when the new balance is not representable.
    pub fn deposit(&self, number: AccountNumber, amount: Decimal) -> ServiceResult<()> {
        ensure_positive(amount)?;

        let new_balance = self.mutate_balance(number, |balance| credit(balance, amount))?;

        info!(
            "event=account_deposit module=service status=ok number={number} balance={new_balance}"
        );
        Ok(())
    }

    /// Closes an account whose balance is zero.
    ///
    /// The close is guarded by the zero balance just read, so a concurrent
    /// deposit forces a re-check instead of closing a funded account.
    pub fn close(&self, number: AccountNumber) -> ServiceResult<()> {
        self.with_balance_retries(|| {
            let account = self.get_by_number(number)?;
            if account.has_balance() {
                return Err(BusinessRuleError::AccountStillFunded.into());
            }
            self.repo.close(number, account.balance)?;
            Ok(())
        })?;

        info!("event=account_close module=service status=ok number={number}");
        Ok(())
    }

    /// Gets one open account by number.
    ///
    /// # Errors
    /// - `AccountNotFound` when no open account has this number.
    pub fn get_by_number(&self, number: AccountNumber) -> ServiceResult<Account> {
        self.repo
            .find_by_number(number)?
            .ok_or(ServiceError::BusinessRule(
                BusinessRuleError::AccountNotFound(number),
            ))
    }

    /// Moves `amount` from `source` to `destination` atomically.
    ///
    /// Returns `Ok(false)` when a business rule rejected the transfer; in that
    /// case neither balance changed. Store failures propagate as `Err`.
    pub fn transfer(
        &self,
        source: AccountNumber,
        destination: AccountNumber,
        amount: Decimal,
    ) -> ServiceResult<bool> {
        let started_at = Instant::now();
        match self.try_transfer(source, destination, amount) {
            Ok(()) => {
                info!(
                    "event=account_transfer module=service status=ok source={source} destination={destination} amount={amount} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(true)
            }
            Err(ServiceError::BusinessRule(rule)) => {
                warn!(
                    "event=account_transfer module=service status=rejected source={source} destination={destination} amount={amount} reason=\"{rule}\""
                );
                Ok(false)
            }
            Err(err) => {
                warn!(
                    "event=account_transfer module=service status=error source={source} destination={destination} duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    fn try_transfer(
        &self,
        source: AccountNumber,
        destination: AccountNumber,
        amount: Decimal,
    ) -> ServiceResult<()> {
        ensure_positive(amount)?;
        if source == destination {
            return Err(BusinessRuleError::SameAccountTransfer.into());
        }

        self.with_balance_retries(|| {
            let from = self.get_by_number(source)?;
            if amount > from.balance {
                return Err(BusinessRuleError::InsufficientBalance.into());
            }
            let to = self.get_by_number(destination)?;

            let debit = BalanceChange {
                number: from.number,
                expected: from.balance,
                new_balance: from.balance - amount,
            };
            let credit = BalanceChange {
                number: to.number,
                expected: to.balance,
                new_balance: credit(to.balance, amount)?,
            };
            self.repo.transfer_balances(&debit, &credit)?;
            Ok(())
        })
    }

    /// Reads the balance, lets `compute` derive the new one and writes it
    /// guarded by the value just read. Returns the written balance.
    fn mutate_balance<F>(&self, number: AccountNumber, compute: F) -> ServiceResult<Decimal>
    where
        F: Fn(Decimal) -> Result<Decimal, BusinessRuleError>,
    {
        self.with_balance_retries(|| {
            let account = self.get_by_number(number)?;
            let new_balance = compute(account.balance)?;
            self.repo
                .update_balance(number, account.balance, new_balance)?;
            Ok(new_balance)
        })
    }

    fn with_balance_retries<T, F>(&self, mut attempt: F) -> ServiceResult<T>
    where
        F: FnMut() -> ServiceResult<T>,
    {
        let mut retries = 0;
        loop {
            match attempt() {
                Err(ServiceError::Store(StoreError::BalanceConflict { number, .. }))
                    if retries < self.config.max_balance_retries =>
                {
                    retries += 1;
                    warn!(
                        "event=balance_conflict module=service status=retry number={number} attempt={retries}"
                    );
                }
                Err(ServiceError::Store(err)) => return Err(not_found_as_rule(err)),
                other => return other,
            }
        }
    }
}

fn ensure_positive(amount: Decimal) -> Result<(), BusinessRuleError> {
    if amount <= Decimal::ZERO {
        return Err(BusinessRuleError::InvalidAmount);
    }
    Ok(())
}

fn credit(balance: Decimal, amount: Decimal) -> Result<Decimal, BusinessRuleError> {
    balance
        .checked_add(amount)
        .ok_or(BusinessRuleError::BalanceOverflow)
}

fn not_found_as_rule(err: StoreError) -> ServiceError {
    match err {
        StoreError::NotFound(number) => {
            ServiceError::BusinessRule(BusinessRuleError::AccountNotFound(number))
        }
        other => ServiceError::Store(other),
    }
}

#[cfg(test)]
mod tests {
    use super::{AccountService, AccountServiceConfig, BusinessRuleError, ServiceError};
    use crate::db::ConnectionPool;
    use crate::model::account::{Account, AccountNumber, Customer, OpenAccountRequest};
    use crate::repo::account_repo::{
        AccountRepository, BalanceChange, SqliteAccountRepository, StoreError, StoreResult,
    };
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::cell::Cell;

    /// Reports a conflict for the first `conflicts` balance writes.
    struct FlakyRepo {
        inner: SqliteAccountRepository,
        conflicts: Cell<u32>,
    }

    impl FlakyRepo {
        fn take_conflict(&self, number: AccountNumber) -> StoreResult<()> {
            let left = self.conflicts.get();
            if left == 0 {
                return Ok(());
            }
            self.conflicts.set(left - 1);
            Err(StoreError::BalanceConflict {
                number,
                expected: Decimal::ZERO,
                actual: Decimal::ONE,
            })
        }
    }

    impl AccountRepository for FlakyRepo {
        fn open(&self, request: &OpenAccountRequest) -> StoreResult<()> {
            self.inner.open(request)
        }

        fn list_active(&self) -> StoreResult<Vec<Account>> {
            self.inner.list_active()
        }

        fn find_by_number(&self, number: AccountNumber) -> StoreResult<Option<Account>> {
            self.inner.find_by_number(number)
        }

        fn update_balance(
            &self,
            number: AccountNumber,
            expected: Decimal,
            new_balance: Decimal,
        ) -> StoreResult<()> {
            self.take_conflict(number)?;
            self.inner.update_balance(number, expected, new_balance)
        }

        fn transfer_balances(
            &self,
            source: &BalanceChange,
            destination: &BalanceChange,
        ) -> StoreResult<()> {
            self.take_conflict(source.number)?;
            self.inner.transfer_balances(source, destination)
        }

        fn close(&self, number: AccountNumber, expected: Decimal) -> StoreResult<()> {
            self.inner.close(number, expected)
        }
    }

    /// Lands a deposit between the service's balance read and its close.
    struct DepositBeforeCloseRepo {
        inner: SqliteAccountRepository,
        deposit: Cell<Option<Decimal>>,
    }

    impl AccountRepository for DepositBeforeCloseRepo {
        fn open(&self, request: &OpenAccountRequest) -> StoreResult<()> {
            self.inner.open(request)
        }

        fn list_active(&self) -> StoreResult<Vec<Account>> {
            self.inner.list_active()
        }

        fn find_by_number(&self, number: AccountNumber) -> StoreResult<Option<Account>> {
            self.inner.find_by_number(number)
        }

        fn update_balance(
            &self,
            number: AccountNumber,
            expected: Decimal,
            new_balance: Decimal,
        ) -> StoreResult<()> {
            self.inner.update_balance(number, expected, new_balance)
        }

        fn transfer_balances(
            &self,
            source: &BalanceChange,
            destination: &BalanceChange,
        ) -> StoreResult<()> {
            self.inner.transfer_balances(source, destination)
        }

        fn close(&self, number: AccountNumber, expected: Decimal) -> StoreResult<()> {
            if let Some(amount) = self.deposit.take() {
                self.inner.update_balance(number, Decimal::ZERO, amount)?;
            }
            self.inner.close(number, expected)
        }
    }

    fn flaky_service(conflicts: u32, max_balance_retries: u32) -> AccountService<FlakyRepo> {
        let pool = ConnectionPool::in_memory().unwrap();
        let repo = FlakyRepo {
            inner: SqliteAccountRepository::new(pool),
            conflicts: Cell::new(conflicts),
        };
        let service =
            AccountService::with_config(repo, AccountServiceConfig { max_balance_retries });
        for number in [1, 2] {
            let customer = Customer::new("Ana", "111", "ana@example.com").unwrap();
            service
                .open(&OpenAccountRequest::new(number, customer))
                .unwrap();
        }
        service
    }

    #[test]
    fn deposit_retries_after_balance_conflict() {
        let service = flaky_service(2, 3);
        service.deposit(1, dec!(10.00)).unwrap();
        assert_eq!(service.get_balance(1).unwrap(), dec!(10.00));
    }

    #[test]
    fn conflict_propagates_once_retries_are_exhausted() {
        let service = flaky_service(5, 1);
        let err = service.deposit(1, dec!(10.00)).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Store(StoreError::BalanceConflict { number: 1, .. })
        ));
        assert_eq!(service.get_balance(1).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn transfer_reports_exhausted_conflict_as_error_not_false() {
        let service = flaky_service(0, 0);
        service.deposit(1, dec!(5)).unwrap();

        let service = AccountService::with_config(
            FlakyRepo {
                inner: service.repo.inner.clone(),
                conflicts: Cell::new(1),
            },
            AccountServiceConfig {
                max_balance_retries: 0,
            },
        );
        assert!(service.transfer(1, 2, dec!(5)).is_err());
        assert_eq!(service.get_balance(1).unwrap(), dec!(5));
        assert_eq!(service.get_balance(2).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn rule_messages_are_human_readable() {
        assert_eq!(
            BusinessRuleError::InvalidAmount.to_string(),
            "amount must exceed zero"
        );
        assert_eq!(
            BusinessRuleError::AccountNotFound(9).to_string(),
            "no account with that number"
        );
    }

    #[test]
    fn close_rechecks_balance_after_concurrent_deposit() {
        let repo = DepositBeforeCloseRepo {
            inner: SqliteAccountRepository::new(ConnectionPool::in_memory().unwrap()),
            deposit: Cell::new(Some(dec!(50))),
        };
        let service = AccountService::new(repo);
        let customer = Customer::new("Ana", "111", "ana@example.com").unwrap();
        service
            .open(&OpenAccountRequest::new(1, customer))
            .unwrap();

        let err = service.close(1).unwrap_err();
        assert_eq!(
            err.business_rule(),
            Some(&BusinessRuleError::AccountStillFunded)
        );

        let account = service.get_by_number(1).unwrap();
        assert!(account.active);
        assert_eq!(account.balance, dec!(50));
    }

    #[test]
    fn deposit_past_largest_balance_is_rejected() {
        let service = flaky_service(0, 0);
        service.deposit(1, Decimal::MAX).unwrap();

        let err = service.deposit(1, dec!(1)).unwrap_err();
        assert_eq!(err.business_rule(), Some(&BusinessRuleError::BalanceOverflow));
        assert_eq!(service.get_balance(1).unwrap(), Decimal::MAX);
    }

    #[test]
    fn transfer_that_would_overflow_destination_returns_false() {
        let service = flaky_service(0, 0);
        service.deposit(1, dec!(1)).unwrap();
        service.deposit(2, Decimal::MAX).unwrap();

        assert!(!service.transfer(1, 2, dec!(1)).unwrap());
        assert_eq!(service.get_balance(1).unwrap(), dec!(1));
        assert_eq!(service.get_balance(2).unwrap(), Decimal::MAX);
    }
}
