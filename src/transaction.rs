use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    account::{AccountId, CardId},
    currency::Currency,
};

pub type TransactionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    P2p,
    CardPayment,
    TopUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

/// A ledger row that has not been appended yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub source: Option<AccountId>,
    pub destination: Option<AccountId>,
    pub card: Option<CardId>,
    pub amount: Decimal,
    pub currency: Currency,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub reference: Option<String>,
    pub balance_after: Option<Decimal>,
}

impl NewTransaction {
    pub fn top_up(
        account: AccountId,
        amount: Decimal,
        currency: Currency,
        reference: Option<String>,
        balance_after: Decimal,
    ) -> Self {
        Self {
            source: None,
            destination: Some(account),
            card: None,
            amount,
            currency,
            kind: TransactionKind::TopUp,
            status: TransactionStatus::Completed,
            reference,
            balance_after: Some(balance_after),
        }
    }

    pub fn p2p(
        from: AccountId,
        to: AccountId,
        amount: Decimal,
        currency: Currency,
        reference: Option<String>,
        balance_after: Decimal,
    ) -> Self {
        Self {
            source: Some(from),
            destination: Some(to),
            card: None,
            amount,
            currency,
            kind: TransactionKind::P2p,
            status: TransactionStatus::Completed,
            reference,
            balance_after: Some(balance_after),
        }
    }

    /// Funds leave to the acquirer, so there is no destination account.
    pub fn card_payment(
        account: AccountId,
        card: CardId,
        amount: Decimal,
        currency: Currency,
        reference: Option<String>,
        balance_after: Decimal,
    ) -> Self {
        Self {
            source: Some(account),
            destination: None,
            card: Some(card),
            amount,
            currency,
            kind: TransactionKind::CardPayment,
            status: TransactionStatus::Completed,
            reference,
            balance_after: Some(balance_after),
        }
    }

    /// Audit row for a declined authorization. Carries no balance.
    pub fn declined_card_payment(
        account: Option<AccountId>,
        card: Option<CardId>,
        amount: Decimal,
        currency: Currency,
        reference: Option<String>,
    ) -> Self {
        Self {
            source: account,
            destination: None,
            card,
            amount,
            currency,
            kind: TransactionKind::CardPayment,
            status: TransactionStatus::Failed,
            reference,
            balance_after: None,
        }
    }
}

/// An appended, immutable ledger row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub source: Option<AccountId>,
    pub destination: Option<AccountId>,
    pub card: Option<CardId>,
    pub amount: Decimal,
    pub currency: Currency,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub reference: Option<String>,
    /// Balance of the account the money moved on, right after the movement:
    /// the source for p2p and card payments, the destination for top-ups.
    pub balance_after: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub(crate) fn from_new(id: TransactionId, tx: NewTransaction, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            source: tx.source,
            destination: tx.destination,
            card: tx.card,
            amount: tx.amount,
            currency: tx.currency,
            kind: tx.kind,
            status: tx.status,
            reference: tx.reference,
            balance_after: tx.balance_after,
            created_at,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TransactionStatus::Completed
    }

    pub fn involves(&self, account: AccountId) -> bool {
        self.source == Some(account) || self.destination == Some(account)
    }
}

/// Read-only ledger lookup. Empty filter matches every row.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub reference: Option<String>,
    /// Rows where the account is either the sender or the receiver.
    pub account: Option<AccountId>,
    pub kind: Option<TransactionKind>,
    pub limit: Option<usize>,
}

impl TransactionFilter {
    pub fn by_reference(reference: impl Into<String>) -> Self {
        Self {
            reference: Some(reference.into()),
            ..Default::default()
        }
    }

    pub fn by_account(account: AccountId) -> Self {
        Self {
            account: Some(account),
            ..Default::default()
        }
    }

    pub fn with_kind(self, kind: TransactionKind) -> Self {
        Self {
            kind: Some(kind),
            ..self
        }
    }

    pub fn with_limit(self, limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..self
        }
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        if let Some(reference) = &self.reference {
            if tx.reference.as_deref() != Some(reference.as_str()) {
                return false;
            }
        }
        if let Some(account) = self.account {
            if !tx.involves(account) {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if tx.kind != kind {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn recorded(id: TransactionId, tx: NewTransaction) -> Transaction {
        Transaction::from_new(id, tx, Utc::now())
    }

    #[test]
    fn constructors_set_direction() {
        let top_up = NewTransaction::top_up(4, dec!(100), Currency::Usd, None, dec!(100));
        assert_eq!((top_up.source, top_up.destination), (None, Some(4)));
        assert_eq!(top_up.kind, TransactionKind::TopUp);
        assert_eq!(top_up.status, TransactionStatus::Completed);

        let payment =
            NewTransaction::card_payment(4, 9, dec!(27.50), Currency::Usd, Some("k".into()), dec!(472.50));
        assert_eq!((payment.source, payment.destination), (Some(4), None));
        assert_eq!(payment.card, Some(9));

        let declined =
            NewTransaction::declined_card_payment(Some(4), Some(9), dec!(10), Currency::Lbp, None);
        assert_eq!(declined.status, TransactionStatus::Failed);
        assert!(declined.balance_after.is_none());
    }

    #[test]
    fn filter_matching() {
        let p2p = recorded(
            1,
            NewTransaction::p2p(1, 2, dec!(25), Currency::Usd, Some("ref-1".into()), dec!(75)),
        );
        let top_up = recorded(2, NewTransaction::top_up(3, dec!(5), Currency::Lbp, None, dec!(5)));

        assert!(TransactionFilter::default().matches(&p2p));
        assert!(TransactionFilter::by_account(1).matches(&p2p));
        assert!(TransactionFilter::by_account(2).matches(&p2p));
        assert!(!TransactionFilter::by_account(3).matches(&p2p));
        assert!(TransactionFilter::by_reference("ref-1").matches(&p2p));
        assert!(!TransactionFilter::by_reference("ref-1").matches(&top_up));
        assert!(
            TransactionFilter::by_account(3)
                .with_kind(TransactionKind::TopUp)
                .matches(&top_up)
        );
        assert!(
            !TransactionFilter::by_account(1)
                .with_kind(TransactionKind::CardPayment)
                .matches(&p2p)
        );
    }

    #[test]
    fn serialized_names() {
        let tx = recorded(
            1,
            NewTransaction::card_payment(1, 1, dec!(1.5), Currency::Usd, None, dec!(2)),
        );
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["kind"], "card_payment");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["currency"], "USD");
        assert_eq!(json["amount"], "1.5");
    }
}
