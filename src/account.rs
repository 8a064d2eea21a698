use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::currency::Currency;

pub type AccountId = u32;
pub type CardId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceEventKind {
    Credited,
    Debited,
}

/// A validated balance change. Produced by [`Account::handle_debit`] and
/// [`Account::handle_credit`], applied by the balance store while it holds the
/// account lock.
#[derive(Debug, Clone)]
pub struct BalanceEvent {
    account: AccountId,
    currency: Currency,
    amount: Decimal,
    kind: BalanceEventKind,
}

impl BalanceEvent {
    pub fn account(&self) -> AccountId {
        self.account
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn kind(&self) -> BalanceEventKind {
        self.kind
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BalanceError {
    #[error("Amount must be positive, got {amount}")]
    InvalidAmount { amount: Decimal },
    #[error("Insufficient {currency} funds on account {account}")]
    InsufficientFunds {
        account: AccountId,
        currency: Currency,
    },
    #[error("Credit of {amount} overflows the {currency} balance of account {account}")]
    BalanceOverflow {
        account: AccountId,
        currency: Currency,
        amount: Decimal,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    id: AccountId,
    usd: Decimal,
    lbp: Decimal,
}

impl Account {
    pub fn new(id: AccountId) -> Self {
        Self {
            id,
            usd: Decimal::ZERO,
            lbp: Decimal::ZERO,
        }
    }

    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn balance(&self, currency: Currency) -> Decimal {
        match currency {
            Currency::Usd => self.usd,
            Currency::Lbp => self.lbp,
        }
    }

    fn balance_mut(&mut self, currency: Currency) -> &mut Decimal {
        match currency {
            Currency::Usd => &mut self.usd,
            Currency::Lbp => &mut self.lbp,
        }
    }

    pub fn handle_debit(
        &self,
        currency: Currency,
        amount: Decimal,
    ) -> Result<BalanceEvent, BalanceError> {
        if amount <= Decimal::ZERO {
            return Err(BalanceError::InvalidAmount { amount });
        }
        if self.balance(currency) < amount {
            return Err(BalanceError::InsufficientFunds {
                account: self.id,
                currency,
            });
        }
        Ok(BalanceEvent {
            account: self.id,
            currency,
            amount,
            kind: BalanceEventKind::Debited,
        })
    }

    pub fn handle_credit(
        &self,
        currency: Currency,
        amount: Decimal,
    ) -> Result<BalanceEvent, BalanceError> {
        if amount <= Decimal::ZERO {
            return Err(BalanceError::InvalidAmount { amount });
        }
        if self.balance(currency).checked_add(amount).is_none() {
            return Err(BalanceError::BalanceOverflow {
                account: self.id,
                currency,
                amount,
            });
        }
        Ok(BalanceEvent {
            account: self.id,
            currency,
            amount,
            kind: BalanceEventKind::Credited,
        })
    }

    /// Events are the source of truth, no validation happens here. A credit
    /// event was checked against overflow when it was handled.
    pub(crate) fn apply(&mut self, event: &BalanceEvent) {
        let balance = self.balance_mut(event.currency);
        match event.kind {
            BalanceEventKind::Credited => *balance += event.amount,
            BalanceEventKind::Debited => *balance -= event.amount,
        }
    }

    /// Undoes an event previously applied to this account. Events must be
    /// reverted in the reverse order they were applied.
    pub(crate) fn revert(&mut self, event: &BalanceEvent) {
        let balance = self.balance_mut(event.currency);
        match event.kind {
            BalanceEventKind::Credited => *balance -= event.amount,
            BalanceEventKind::Debited => *balance += event.amount,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardKind {
    Physical,
    Virtual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    Active,
    Frozen,
    Cancelled,
}

impl fmt::Display for CardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CardStatus::Active => "active",
            CardStatus::Frozen => "frozen",
            CardStatus::Cancelled => "cancelled",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub id: CardId,
    pub account: AccountId,
    /// Number as issued by card management, used as the lookup key.
    pub number: String,
    pub kind: CardKind,
    pub status: CardStatus,
}

impl Card {
    pub fn is_active(&self) -> bool {
        match self.status {
            CardStatus::Active => true,
            CardStatus::Frozen | CardStatus::Cancelled => false,
        }
    }

    pub fn masked_number(&self) -> String {
        mask_card_number(&self.number)
    }
}

/// Hides everything except the last four characters.
pub fn mask_card_number(number: &str) -> String {
    let len = number.chars().count();
    number
        .chars()
        .enumerate()
        .map(|(pos, c)| if pos + 4 < len { '*' } else { c })
        .collect()
}
