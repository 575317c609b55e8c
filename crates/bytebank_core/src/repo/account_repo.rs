//! Account repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Map `conta` rows to [`Account`] records and back.
//! - Run balance mutations inside guarded immediate transactions.
//!
//! # Invariants
//! - Lookups and listings only ever return rows with `esta_ativa = 1`.
//! - Balance writes and closes check the caller's expected balance under the
//!   write lock and roll back on any mismatch or failure.
//! - Read paths reject invalid persisted state instead of masking it.
//! - No business rules live here; callers decide what a valid balance is.

use crate::db::{ConnectionPool, DbError};
use crate::model::account::{Account, AccountNumber, Customer, OpenAccountRequest};
use log::debug;
use rust_decimal::Decimal;
use rusqlite::{params, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

// Row decoding below is positional and follows this column order.
const ACCOUNT_SELECT_SQL: &str = "SELECT
    numero,
    saldo,
    cliente_nome,
    cliente_cpf,
    cliente_email,
    esta_ativa
FROM conta";

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence-layer failure for account operations.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    /// No active row matched the number.
    NotFound(AccountNumber),
    /// Stored balance moved since the caller read it.
    BalanceConflict {
        number: AccountNumber,
        expected: Decimal,
        actual: Decimal,
    },
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(number) => write!(f, "active account not found: {number}"),
            Self::BalanceConflict {
                number,
                expected,
                actual,
            } => write!(
                f,
                "balance of account {number} changed concurrently: expected {expected}, found {actual}"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted account data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NotFound(_) => None,
            Self::BalanceConflict { .. } => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Guarded balance write: applies `new_balance` only if the stored balance
/// still equals `expected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceChange {
    pub number: AccountNumber,
    pub expected: Decimal,
    pub new_balance: Decimal,
}

/// Repository interface for account persistence.
pub trait AccountRepository {
    /// Inserts a new active account with zero balance.
    fn open(&self, request: &OpenAccountRequest) -> StoreResult<()>;
    /// Lists active accounts ordered by number.
    fn list_active(&self) -> StoreResult<Vec<Account>>;
    /// Gets one active account, `None` when absent or closed.
    fn find_by_number(&self, number: AccountNumber) -> StoreResult<Option<Account>>;
    /// Writes a new balance in one transaction, guarded by `expected`.
    fn update_balance(
        &self,
        number: AccountNumber,
        expected: Decimal,
        new_balance: Decimal,
    ) -> StoreResult<()>;
    /// Applies two guarded balance writes atomically.
    fn transfer_balances(&self, source: &BalanceChange, destination: &BalanceChange)
        -> StoreResult<()>;
    /// Marks an account closed, guarded by `expected` like balance writes.
    /// Applies no business rule to the balance itself.
    fn close(&self, number: AccountNumber, expected: Decimal) -> StoreResult<()>;
}

/// SQLite-backed account repository.
#[derive(Clone)]
pub struct SqliteAccountRepository {
    pool: ConnectionPool,
}

impl SqliteAccountRepository {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    fn apply_changes(&self, changes: &[&BalanceChange]) -> StoreResult<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        for change in changes {
            apply_change_in_tx(&tx, change)?;
        }
        tx.commit()?;
        Ok(())
    }
}

impl AccountRepository for SqliteAccountRepository {
    fn open(&self, request: &OpenAccountRequest) -> StoreResult<()> {
        let account = Account::opened(request.clone());
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO conta (
                numero,
                saldo,
                cliente_nome,
                cliente_cpf,
                cliente_email,
                esta_ativa
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                account.number,
                account.balance.to_string(),
                account.owner.name(),
                account.owner.tax_id(),
                account.owner.email(),
                bool_to_int(account.active),
            ],
        )?;

        debug!(
            "event=account_insert module=repo status=ok number={}",
            account.number
        );
        Ok(())
    }

    fn list_active(&self) -> StoreResult<Vec<Account>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "{ACCOUNT_SELECT_SQL}
             WHERE esta_ativa = 1
             ORDER BY numero ASC;"
        ))?;

        let mut rows = stmt.query([])?;
        let mut accounts = Vec::new();
        while let Some(row) = rows.next()? {
            accounts.push(parse_account_row(row)?);
        }

        Ok(accounts)
    }

    fn find_by_number(&self, number: AccountNumber) -> StoreResult<Option<Account>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "{ACCOUNT_SELECT_SQL}
             WHERE numero = ?1
               AND esta_ativa = 1;"
        ))?;

        let mut rows = stmt.query([number])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_account_row(row)?));
        }

        Ok(None)
    }

    fn update_balance(
        &self,
        number: AccountNumber,
        expected: Decimal,
        new_balance: Decimal,
    ) -> StoreResult<()> {
        let change = BalanceChange {
            number,
            expected,
            new_balance,
        };
        self.apply_changes(&[&change])
    }

    fn transfer_balances(
        &self,
        source: &BalanceChange,
        destination: &BalanceChange,
    ) -> StoreResult<()> {
        self.apply_changes(&[source, destination])
    }

    fn close(&self, number: AccountNumber, expected: Decimal) -> StoreResult<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        check_expected_balance(&tx, number, expected)?;
        tx.execute(
            "UPDATE conta
             SET esta_ativa = 0
             WHERE numero = ?1;",
            [number],
        )?;
        tx.commit()?;

        debug!("event=account_deactivate module=repo status=ok number={number}");
        Ok(())
    }
}

fn apply_change_in_tx(tx: &Transaction<'_>, change: &BalanceChange) -> StoreResult<()> {
    check_expected_balance(tx, change.number, change.expected)?;
    tx.execute(
        "UPDATE conta
         SET saldo = ?1
         WHERE numero = ?2;",
        params![change.new_balance.to_string(), change.number],
    )?;

    Ok(())
}

// Must run inside a write transaction so the checked balance cannot move
// before the caller's update.
fn check_expected_balance(
    tx: &Transaction<'_>,
    number: AccountNumber,
    expected: Decimal,
) -> StoreResult<()> {
    let stored: Option<String> = tx
        .query_row(
            "SELECT saldo
             FROM conta
             WHERE numero = ?1
               AND esta_ativa = 1;",
            [number],
            |row| row.get(0),
        )
        .optional()?;

    let Some(stored) = stored else {
        return Err(StoreError::NotFound(number));
    };

    let actual = parse_balance(&stored)?;
    if actual != expected {
        return Err(StoreError::BalanceConflict {
            number,
            expected,
            actual,
        });
    }

    Ok(())
}

fn parse_account_row(row: &Row<'_>) -> StoreResult<Account> {
    let number: AccountNumber = row.get(0)?;

    let balance_text: String = row.get(1)?;
    let balance = parse_balance(&balance_text)?;
    if balance < Decimal::ZERO {
        return Err(StoreError::InvalidData(format!(
            "negative balance `{balance_text}` in conta.saldo for account {number}"
        )));
    }

    let owner = Customer::new(
        row.get::<_, String>(2)?,
        row.get::<_, String>(3)?,
        row.get::<_, String>(4)?,
    )
    .map_err(|err| {
        StoreError::InvalidData(format!("invalid customer for account {number}: {err}"))
    })?;

    let active = match row.get::<_, i64>(5)? {
        0 => false,
        1 => true,
        other => {
            return Err(StoreError::InvalidData(format!(
                "invalid esta_ativa value `{other}` in conta.esta_ativa"
            )));
        }
    };

    Ok(Account {
        number,
        balance,
        owner,
        active,
    })
}

fn parse_balance(value: &str) -> StoreResult<Decimal> {
    Decimal::from_str(value)
        .map_err(|_| StoreError::InvalidData(format!("invalid decimal `{value}` in conta.saldo")))
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
