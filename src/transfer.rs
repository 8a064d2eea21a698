use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    account::AccountId,
    command::{TopUpCommand, TransferCommand},
    currency::Currency,
    error::LedgerError,
    idempotency::{IdempotencyResolver, Resolution},
    store::{LedgerStore, UnitOfWork},
    transaction::{NewTransaction, Transaction},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountBalance {
    pub account: AccountId,
    pub currency: Currency,
    pub balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferReceipt {
    pub transaction: Transaction,
    /// Balances read inside the unit of work, right after the mutation.
    pub balances: Vec<AccountBalance>,
}

impl TransferReceipt {
    pub fn balance_of(&self, account: AccountId) -> Option<Decimal> {
        self.balances
            .iter()
            .find(|b| b.account == account)
            .map(|b| b.balance)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    Executed(TransferReceipt),
    /// The reference was already used. Nothing was executed, the row holding
    /// the reference is returned as is.
    Duplicate(Transaction),
}

pub struct TransferEngine<S> {
    store: Arc<S>,
    idempotency: Arc<IdempotencyResolver<S>>,
}

impl<S> TransferEngine<S>
where
    S: LedgerStore,
{
    pub fn new(store: Arc<S>, idempotency: Arc<IdempotencyResolver<S>>) -> Self {
        Self { store, idempotency }
    }

    pub fn top_up(
        &self,
        account: AccountId,
        amount: Decimal,
        currency: &str,
        reference: Option<&str>,
    ) -> Result<TransferOutcome, LedgerError> {
        let command = TopUpCommand::parse(account, amount, currency, reference)?;
        let resolution = self
            .idempotency
            .resolve_or_execute(command.reference.as_deref(), || {
                self.execute_top_up(&command)
            })?;
        Ok(into_outcome(resolution))
    }

    pub fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Decimal,
        currency: &str,
        reference: Option<&str>,
    ) -> Result<TransferOutcome, LedgerError> {
        let command = TransferCommand::parse(from, to, amount, currency, reference)?;
        let resolution = self
            .idempotency
            .resolve_or_execute(command.reference.as_deref(), || {
                self.execute_transfer(&command)
            })?;
        Ok(into_outcome(resolution))
    }

    fn execute_top_up(&self, command: &TopUpCommand) -> Result<TransferReceipt, LedgerError> {
        let mut unit = self.store.begin(&[command.account])?;
        let balance = unit.credit(command.account, command.currency, command.amount)?;
        unit.record(NewTransaction::top_up(
            command.account,
            command.amount,
            command.currency,
            command.reference.clone(),
            balance,
        ));
        let transaction = single_row(unit.commit()?)?;

        info!(
            transaction = transaction.id,
            account = command.account,
            currency = %command.currency,
            amount = %command.amount,
            "Top-up completed"
        );
        Ok(TransferReceipt {
            transaction,
            balances: vec![AccountBalance {
                account: command.account,
                currency: command.currency,
                balance,
            }],
        })
    }

    /// Debit, credit and the ledger row commit together. Any failure drops
    /// the unit, which restores both balances before the locks are released.
    fn execute_transfer(&self, command: &TransferCommand) -> Result<TransferReceipt, LedgerError> {
        let mut unit = self.store.begin(&[command.from, command.to])?;
        let from_balance = unit.debit(command.from, command.currency, command.amount)?;
        let to_balance = unit.credit(command.to, command.currency, command.amount)?;
        unit.record(NewTransaction::p2p(
            command.from,
            command.to,
            command.amount,
            command.currency,
            command.reference.clone(),
            from_balance,
        ));
        let transaction = single_row(unit.commit()?)?;

        info!(
            transaction = transaction.id,
            from = command.from,
            to = command.to,
            currency = %command.currency,
            amount = %command.amount,
            "Transfer completed"
        );
        Ok(TransferReceipt {
            transaction,
            balances: vec![
                AccountBalance {
                    account: command.from,
                    currency: command.currency,
                    balance: from_balance,
                },
                AccountBalance {
                    account: command.to,
                    currency: command.currency,
                    balance: to_balance,
                },
            ],
        })
    }
}

fn into_outcome(resolution: Resolution<TransferReceipt>) -> TransferOutcome {
    match resolution {
        Resolution::Fresh(receipt) => TransferOutcome::Executed(receipt),
        Resolution::Replayed(tx) | Resolution::PreviouslyDeclined(tx) => {
            warn!(
                transaction = tx.id,
                reference = tx.reference.as_deref().unwrap_or_default(),
                "Rejected request with a used reference"
            );
            TransferOutcome::Duplicate(tx)
        }
    }
}

fn single_row(rows: Vec<Transaction>) -> Result<Transaction, LedgerError> {
    rows.into_iter()
        .next()
        .ok_or_else(|| LedgerError::StoreUnavailable("commit recorded no rows".to_string()))
}
