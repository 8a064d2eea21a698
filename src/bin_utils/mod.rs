//! This module could be a separate crate on its own, to bootstrap the ledger within a binary
//! but for simplicity purposes, I include this module directly in the library.

use std::{
    io::{Read, Write},
    sync::Arc,
};

use anyhow::Result;
use csv_parser::{CsvOperationParser, Operation, OperationKind};
use csv_printer::{AccountRow, print_accounts};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::{
    account::{AccountId, CardKind, CardStatus},
    authorization::DeclineReason,
    command::AuthorizeCommand,
    config::LedgerConfig,
    currency::Currency,
    error::LedgerError,
    store::in_memory::InMemoryStore,
    wallet::Wallet,
};

pub mod csv_parser;
pub mod csv_printer;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("Malformed row: {0}")]
    Parse(#[from] csv::Error),
    #[error("`{kind:?}` requires the `{field}` column")]
    MissingField {
        kind: OperationKind,
        field: &'static str,
    },
    #[error("Account {0} already exists")]
    AccountExists(AccountId),
    #[error("Authorization declined: {0}")]
    Declined(DeclineReason),
}

impl ReplayError {
    /// Same split as [`LedgerError::is_business_outcome`], with declines added.
    /// A decline caused by a store failure is still a failure.
    pub fn is_business_outcome(&self) -> bool {
        match self {
            ReplayError::Ledger(err) => err.is_business_outcome(),
            ReplayError::Declined(reason) => *reason != DeclineReason::SystemError,
            ReplayError::Parse(_)
            | ReplayError::MissingField { .. }
            | ReplayError::AccountExists(_) => false,
        }
    }
}

pub struct Service<'w, R, W: 'w> {
    pub input: R,
    pub output: &'w mut W,
    pub config: LedgerConfig,
    pub error_printer: Box<dyn FnMut(u64, ReplayError)>,
}

impl<'w, R, W> Service<'w, R, W>
where
    R: Read,
    W: Write + 'w,
{
    pub fn run(mut self) -> Result<()> {
        let parser = CsvOperationParser::new(self.input);

        let store = Arc::new(InMemoryStore::default());
        let wallet = Wallet::new(store.clone(), &self.config);

        for (line, row) in parser {
            let result = row
                .map_err(ReplayError::from)
                .and_then(|op| replay(&wallet, &op));
            if let Err(err) = result {
                (self.error_printer)(line, err);
            }
        }

        print_accounts(
            self.output,
            store.accounts().into_iter().map(|acc| AccountRow {
                account: acc.id(),
                usd: acc.balance(Currency::Usd),
                lbp: acc.balance(Currency::Lbp),
            }),
        )
    }
}

fn replay(wallet: &Wallet<InMemoryStore>, op: &Operation) -> Result<(), ReplayError> {
    let store = wallet.store();
    match op.kind {
        OperationKind::Open => {
            let account = required(op, "account", op.account)?;
            if !store.open_account(account) {
                return Err(ReplayError::AccountExists(account));
            }
        }
        OperationKind::Card => {
            let account = required(op, "account", op.account)?;
            store.issue_card(account, card_number(op)?, CardKind::Virtual)?;
        }
        OperationKind::Freeze => {
            store.set_card_status(card_number(op)?, CardStatus::Frozen)?;
        }
        OperationKind::Cancel => {
            store.set_card_status(card_number(op)?, CardStatus::Cancelled)?;
        }
        OperationKind::TopUp => {
            wallet.transfers().top_up(
                required(op, "account", op.account)?,
                amount(op)?,
                currency(op)?,
                op.reference.as_deref(),
            )?;
        }
        OperationKind::Transfer => {
            wallet.transfers().transfer(
                required(op, "account", op.account)?,
                required(op, "to", op.to)?,
                amount(op)?,
                currency(op)?,
                op.reference.as_deref(),
            )?;
        }
        OperationKind::Authorize => {
            let command = AuthorizeCommand::parse(
                card_number(op)?,
                amount(op)?,
                currency(op)?,
                op.reference.as_deref(),
            );
            if let Some(reason) = wallet.cards().authorize(&command).reason() {
                return Err(ReplayError::Declined(reason));
            }
        }
    }
    Ok(())
}

fn required<T>(op: &Operation, field: &'static str, value: Option<T>) -> Result<T, ReplayError> {
    value.ok_or(ReplayError::MissingField {
        kind: op.kind,
        field,
    })
}

fn card_number(op: &Operation) -> Result<&str, ReplayError> {
    required(op, "card", op.card.as_deref())
}

fn amount(op: &Operation) -> Result<Decimal, ReplayError> {
    required(op, "amount", op.amount)
}

fn currency(op: &Operation) -> Result<&str, ReplayError> {
    required(op, "currency", op.currency.as_deref())
}
