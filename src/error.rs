use thiserror::Error;

use crate::{
    account::{AccountId, BalanceError, CardStatus},
    command::CommandError,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Balance(#[from] BalanceError),
    #[error("Account {0} not found")]
    AccountNotFound(AccountId),
    /// Holds the masked card number.
    #[error("Card {0} not found")]
    CardNotFound(String),
    #[error("Card {number} is {status}")]
    CardNotActive { number: String, status: CardStatus },
    #[error("A transaction with reference `{0}` already exists")]
    DuplicateReference(String),
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl LedgerError {
    /// Declines rather than failures: the request was well formed and the
    /// store was reachable, the answer is simply no.
    pub fn is_business_outcome(&self) -> bool {
        matches!(
            self,
            LedgerError::Balance(BalanceError::InsufficientFunds { .. })
                | LedgerError::CardNotFound(_)
                | LedgerError::CardNotActive { .. }
        )
    }

    /// Only infrastructure failures are worth retrying by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::StoreUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::currency::Currency;

    #[test]
    fn classify_errors() {
        let insufficient: LedgerError = BalanceError::InsufficientFunds {
            account: 1,
            currency: Currency::Usd,
        }
        .into();
        assert!(insufficient.is_business_outcome());
        assert!(!insufficient.is_retryable());
        assert_eq!(insufficient.to_string(), "Insufficient USD funds on account 1");

        let invalid: LedgerError = CommandError::InvalidAmount { amount: dec!(0) }.into();
        assert!(!invalid.is_business_outcome());
        assert!(!invalid.is_retryable());

        let frozen = LedgerError::CardNotActive {
            number: "************4242".to_string(),
            status: CardStatus::Frozen,
        };
        assert!(frozen.is_business_outcome());
        assert_eq!(frozen.to_string(), "Card ************4242 is frozen");

        assert!(LedgerError::StoreUnavailable("down".into()).is_retryable());
        assert!(!LedgerError::DuplicateReference("k".into()).is_business_outcome());
    }
}
