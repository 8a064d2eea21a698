use rust_decimal::Decimal;
use thiserror::Error;

use crate::{account::AccountId, currency::Currency};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Amount must be positive, got {amount}")]
    InvalidAmount { amount: Decimal },
    #[error("Currency must be USD or LBP, got `{code}`")]
    InvalidCurrency { code: String },
    #[error("Cannot transfer from account {account} to itself")]
    SelfTransfer { account: AccountId },
}

#[derive(Debug, Clone)]
pub struct TopUpCommand {
    pub account: AccountId,
    pub amount: Decimal,
    pub currency: Currency,
    pub reference: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TransferCommand {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Decimal,
    pub currency: Currency,
    pub reference: Option<String>,
}

/// Card authorization as extracted from the network message. Building one
/// never fails: a malformed authorization is declined, not rejected.
#[derive(Debug, Clone)]
pub struct AuthorizeCommand {
    pub card_number: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub idempotency_key: Option<String>,
}

impl AuthorizeCommand {
    pub fn parse(
        card_number: &str,
        amount: Decimal,
        numeric_currency_code: &str,
        idempotency_key: Option<&str>,
    ) -> Self {
        Self {
            card_number: card_number.trim().to_string(),
            amount,
            currency: Currency::from_numeric_code(numeric_currency_code),
            idempotency_key: normalize_reference(idempotency_key),
        }
    }
}

impl TopUpCommand {
    pub fn parse(
        account: AccountId,
        amount: Decimal,
        currency: &str,
        reference: Option<&str>,
    ) -> Result<Self, CommandError> {
        let currency = currency.parse()?;
        Ok(Self {
            account,
            amount: positive(amount)?,
            currency,
            reference: normalize_reference(reference),
        })
    }
}

impl TransferCommand {
    /// Validation order follows the cheapest check first: distinct accounts,
    /// currency, amount. Nothing here touches the store.
    pub fn parse(
        from: AccountId,
        to: AccountId,
        amount: Decimal,
        currency: &str,
        reference: Option<&str>,
    ) -> Result<Self, CommandError> {
        if from == to {
            return Err(CommandError::SelfTransfer { account: from });
        }
        let currency = currency.parse()?;
        Ok(Self {
            from,
            to,
            amount: positive(amount)?,
            currency,
            reference: normalize_reference(reference),
        })
    }
}

fn positive(amount: Decimal) -> Result<Decimal, CommandError> {
    if amount > Decimal::ZERO {
        Ok(amount)
    } else {
        Err(CommandError::InvalidAmount { amount })
    }
}

/// Blank references carry no identity, so they disable deduplication.
pub(crate) fn normalize_reference(reference: Option<&str>) -> Option<String> {
    reference
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn parse_top_up() {
        let cmd = TopUpCommand::parse(1, dec!(100.00), "USD", Some("topup-1")).unwrap();
        assert_eq!(cmd.account, 1);
        assert_eq!(cmd.currency, Currency::Usd);
        assert_eq!(cmd.reference.as_deref(), Some("topup-1"));

        let cmd = TopUpCommand::parse(1, dec!(100.00), "LBP", Some("  ")).unwrap();
        assert!(cmd.reference.is_none());

        assert_eq!(
            TopUpCommand::parse(1, dec!(-50), "USD", None).unwrap_err(),
            CommandError::InvalidAmount { amount: dec!(-50) }
        );
        assert_eq!(
            TopUpCommand::parse(1, dec!(100), "EUR", None).unwrap_err(),
            CommandError::InvalidCurrency {
                code: "EUR".to_string()
            }
        );
    }

    #[test]
    fn parse_transfer() {
        let cmd = TransferCommand::parse(1, 2, dec!(25.00), "USD", None).unwrap();
        assert_eq!((cmd.from, cmd.to), (1, 2));
        assert_eq!(cmd.amount, dec!(25.00));

        let err = TransferCommand::parse(3, 3, dec!(25.00), "USD", None).unwrap_err();
        assert_eq!(err, CommandError::SelfTransfer { account: 3 });
        assert_eq!(err.to_string(), "Cannot transfer from account 3 to itself");

        // self transfer wins over other validation failures
        assert!(matches!(
            TransferCommand::parse(3, 3, dec!(0), "EUR", None),
            Err(CommandError::SelfTransfer { .. })
        ));
        assert!(matches!(
            TransferCommand::parse(1, 2, dec!(0), "USD", None),
            Err(CommandError::InvalidAmount { .. })
        ));
        assert!(matches!(
            TransferCommand::parse(1, 2, dec!(10), "GBP", None),
            Err(CommandError::InvalidCurrency { .. })
        ));
    }

    #[test]
    fn parse_authorization() {
        let cmd = AuthorizeCommand::parse(" 545454******5454 ", dec!(27.50), "840", Some("auth-1"));
        assert_eq!(cmd.card_number, "545454******5454");
        assert_eq!(cmd.currency, Currency::Usd);
        assert_eq!(cmd.idempotency_key.as_deref(), Some("auth-1"));

        let cmd = AuthorizeCommand::parse("545454******5454", dec!(-1), "422", None);
        assert_eq!(cmd.currency, Currency::Lbp);
        assert_eq!(cmd.amount, dec!(-1));
        assert!(cmd.idempotency_key.is_none());
    }
}
