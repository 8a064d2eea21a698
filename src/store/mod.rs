use rust_decimal::Decimal;

use crate::{
    account::{Account, AccountId, Card},
    currency::Currency,
    error::LedgerError,
    transaction::{NewTransaction, Transaction, TransactionFilter},
};

pub mod in_memory;

/// Atomic balance primitives. Each call is its own unit of work: the
/// sufficiency check and the write happen under the same account lock.
pub trait BalanceStore {
    fn read(&self, account: AccountId, currency: Currency) -> Result<Decimal, LedgerError>;

    /// Returns the balance after the debit.
    fn debit(
        &self,
        account: AccountId,
        currency: Currency,
        amount: Decimal,
    ) -> Result<Decimal, LedgerError>;

    /// Returns the balance after the credit.
    fn credit(
        &self,
        account: AccountId,
        currency: Currency,
        amount: Decimal,
    ) -> Result<Decimal, LedgerError>;
}

/// Append-only transaction record.
pub trait TransactionLedger {
    /// Fails with [`LedgerError::DuplicateReference`] when the reference is
    /// already taken.
    fn record(&self, transaction: NewTransaction) -> Result<Transaction, LedgerError>;

    /// Newest first.
    fn query(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, LedgerError>;

    fn find_by_reference(&self, reference: &str) -> Result<Option<Transaction>, LedgerError> {
        let rows = self.query(&TransactionFilter::by_reference(reference).with_limit(1))?;
        Ok(rows.into_iter().next())
    }
}

/// Explicit lookups for records owned by provisioning and card management.
pub trait AccountDirectory {
    fn account_by_id(&self, id: AccountId) -> Result<Option<Account>, LedgerError>;

    fn card_by_number(&self, number: &str) -> Result<Option<Card>, LedgerError>;
}

/// An explicit transaction scope over a fixed set of locked accounts.
///
/// Balance changes are visible to the unit immediately and to everyone else
/// only after [`UnitOfWork::commit`]. Dropping an uncommitted unit rolls every
/// change back.
pub trait UnitOfWork {
    fn balance(&self, account: AccountId, currency: Currency) -> Result<Decimal, LedgerError>;

    fn debit(
        &mut self,
        account: AccountId,
        currency: Currency,
        amount: Decimal,
    ) -> Result<Decimal, LedgerError>;

    fn credit(
        &mut self,
        account: AccountId,
        currency: Currency,
        amount: Decimal,
    ) -> Result<Decimal, LedgerError>;

    /// Stages a ledger row, appended on commit.
    fn record(&mut self, transaction: NewTransaction);

    /// Appends staged rows and makes balance changes durable, all or nothing.
    fn commit(self) -> Result<Vec<Transaction>, LedgerError>;
}

/// Everything the engines need from a backing store.
///
/// NOTE: only an in-memory implementation exists, but this is the point
/// where a database backed store would plug in.
pub trait LedgerStore: BalanceStore + TransactionLedger + AccountDirectory + Send + Sync {
    type Unit<'s>: UnitOfWork
    where
        Self: 's;

    /// Locks `accounts` for the lifetime of the returned unit. Fails with
    /// [`LedgerError::AccountNotFound`] if any of them does not exist.
    fn begin(&self, accounts: &[AccountId]) -> Result<Self::Unit<'_>, LedgerError>;
}
