use std::{fmt, sync::Arc};

use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::{
    account::{BalanceError, Card, CardStatus, mask_card_number},
    command::AuthorizeCommand,
    config::LedgerConfig,
    currency::Currency,
    error::LedgerError,
    idempotency::{IdempotencyResolver, Resolution},
    store::{LedgerStore, UnitOfWork},
    transaction::{NewTransaction, Transaction, TransactionId, TransactionKind},
};

pub mod webhook;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationState {
    Received,
    Deduplicated,
    /// Card found and active.
    Validated,
    Approved,
    Declined,
}

impl AuthorizationState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AuthorizationState::Approved | AuthorizationState::Declined
        )
    }

    pub fn can_advance_to(self, next: AuthorizationState) -> bool {
        use AuthorizationState::*;
        matches!(
            (self, next),
            (Received, Deduplicated | Validated | Declined)
                // another writer recorded the key between validation and commit
                | (Validated, Deduplicated)
                | (Deduplicated | Validated, Approved | Declined)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionCode {
    Approved,
    Declined,
}

impl ActionCode {
    /// Code sent back to the card network.
    pub fn code(self) -> &'static str {
        match self {
            ActionCode::Approved => "00",
            ActionCode::Declined => "05",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclineReason {
    PreviouslyDeclined,
    CardNotFound,
    CardNotActive,
    InvalidAmount,
    InsufficientFunds,
    SystemError,
}

impl fmt::Display for DeclineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeclineReason::PreviouslyDeclined => "previously declined",
            DeclineReason::CardNotFound => "card not found",
            DeclineReason::CardNotActive => "card not active",
            DeclineReason::InvalidAmount => "invalid amount",
            DeclineReason::InsufficientFunds => "insufficient funds",
            DeclineReason::SystemError => "system error",
        })
    }
}

/// Terminal outcome of an authorization. A declined decision never carries
/// the account balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationDecision {
    action: ActionCode,
    reason: Option<DeclineReason>,
    balance: Decimal,
    currency: Currency,
    transaction: Option<TransactionId>,
}

impl AuthorizationDecision {
    fn approved(balance: Decimal, currency: Currency, transaction: Option<TransactionId>) -> Self {
        Self {
            action: ActionCode::Approved,
            reason: None,
            balance,
            currency,
            transaction,
        }
    }

    fn declined(reason: DeclineReason, currency: Currency) -> Self {
        Self {
            action: ActionCode::Declined,
            reason: Some(reason),
            balance: Decimal::ZERO,
            currency,
            transaction: None,
        }
    }

    pub fn action(&self) -> ActionCode {
        self.action
    }

    pub fn is_approved(&self) -> bool {
        self.action == ActionCode::Approved
    }

    pub fn reason(&self) -> Option<DeclineReason> {
        self.reason
    }

    /// Post-debit balance on approval, zero on decline.
    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Ledger row of the approved payment.
    pub fn transaction(&self) -> Option<TransactionId> {
        self.transaction
    }

    pub fn state(&self) -> AuthorizationState {
        match self.action {
            ActionCode::Approved => AuthorizationState::Approved,
            ActionCode::Declined => AuthorizationState::Declined,
        }
    }
}

struct Transitions<'a> {
    card: String,
    reference: Option<&'a str>,
    state: AuthorizationState,
}

impl<'a> Transitions<'a> {
    fn start(command: &'a AuthorizeCommand) -> Self {
        Self {
            card: mask_card_number(&command.card_number),
            reference: command.idempotency_key.as_deref(),
            state: AuthorizationState::Received,
        }
    }

    fn advance(&mut self, next: AuthorizationState) {
        if !self.state.can_advance_to(next) {
            warn!(card = %self.card, from = ?self.state, to = ?next, "Unexpected authorization transition");
        }
        debug!(
            card = %self.card,
            reference = self.reference.unwrap_or_default(),
            from = ?self.state,
            to = ?next,
            "Authorization transition"
        );
        self.state = next;
    }
}

/// Decides card authorizations. Always answers with a decision: every
/// failure, including store outages, ends as a decline.
pub struct CardAuthorizer<S> {
    store: Arc<S>,
    idempotency: Arc<IdempotencyResolver<S>>,
    record_declines: bool,
    approval_code: String,
}

impl<S> CardAuthorizer<S>
where
    S: LedgerStore,
{
    pub fn new(
        store: Arc<S>,
        idempotency: Arc<IdempotencyResolver<S>>,
        config: &LedgerConfig,
    ) -> Self {
        Self {
            store,
            idempotency,
            record_declines: config.record_declined_authorizations,
            approval_code: config.approval_code.clone(),
        }
    }

    pub fn approval_code(&self) -> &str {
        &self.approval_code
    }

    /// Checks run in a fixed order and the first failing one decides:
    /// prior outcome, card lookup, card status, funds.
    pub fn authorize(&self, command: &AuthorizeCommand) -> AuthorizationDecision {
        let mut transitions = Transitions::start(command);
        let resolution = self
            .idempotency
            .resolve_or_execute(command.idempotency_key.as_deref(), || {
                self.evaluate(command, &mut transitions)
            });

        let decision = match resolution {
            Ok(Resolution::Fresh(decision)) => decision,
            Ok(Resolution::Replayed(tx)) => {
                transitions.advance(AuthorizationState::Deduplicated);
                replay(&tx, command.currency)
            }
            Ok(Resolution::PreviouslyDeclined(_)) => {
                transitions.advance(AuthorizationState::Deduplicated);
                AuthorizationDecision::declined(DeclineReason::PreviouslyDeclined, command.currency)
            }
            Err(err) => {
                error!(
                    card = %transitions.card,
                    error = %err,
                    "Authorization failed, declining"
                );
                AuthorizationDecision::declined(DeclineReason::SystemError, command.currency)
            }
        };
        transitions.advance(decision.state());
        decision
    }

    fn evaluate(
        &self,
        command: &AuthorizeCommand,
        transitions: &mut Transitions<'_>,
    ) -> Result<AuthorizationDecision, LedgerError> {
        let Some(card) = self.store.card_by_number(&command.card_number)? else {
            return self.decline(command, None, DeclineReason::CardNotFound);
        };
        match card.status {
            CardStatus::Active => {}
            CardStatus::Frozen | CardStatus::Cancelled => {
                return self.decline(command, Some(&card), DeclineReason::CardNotActive);
            }
        }
        transitions.advance(AuthorizationState::Validated);

        if command.amount <= Decimal::ZERO {
            return self.decline(command, Some(&card), DeclineReason::InvalidAmount);
        }

        let mut unit = self.store.begin(&[card.account])?;
        let balance = match unit.debit(card.account, command.currency, command.amount) {
            Ok(balance) => balance,
            Err(LedgerError::Balance(BalanceError::InsufficientFunds { .. })) => {
                drop(unit);
                return self.decline(command, Some(&card), DeclineReason::InsufficientFunds);
            }
            Err(err) => return Err(err),
        };
        unit.record(NewTransaction::card_payment(
            card.account,
            card.id,
            command.amount,
            command.currency,
            command.idempotency_key.clone(),
            balance,
        ));
        let transaction = unit.commit()?.first().map(|tx| tx.id);

        info!(
            card = %card.masked_number(),
            account = card.account,
            currency = %command.currency,
            amount = %command.amount,
            "Card payment approved"
        );
        Ok(AuthorizationDecision::approved(
            balance,
            command.currency,
            transaction,
        ))
    }

    fn decline(
        &self,
        command: &AuthorizeCommand,
        card: Option<&Card>,
        reason: DeclineReason,
    ) -> Result<AuthorizationDecision, LedgerError> {
        warn!(
            card = %mask_card_number(&command.card_number),
            currency = %command.currency,
            amount = %command.amount,
            %reason,
            "Card payment declined"
        );
        if self.record_declines {
            self.store.record(NewTransaction::declined_card_payment(
                card.map(|c| c.account),
                card.map(|c| c.id),
                command.amount,
                command.currency,
                command.idempotency_key.clone(),
            ))?;
        }
        Ok(AuthorizationDecision::declined(reason, command.currency))
    }
}

/// Only a completed card payment can be replayed as an approval. A key that
/// belongs to anything else was never approved for this card.
fn replay(tx: &Transaction, requested: Currency) -> AuthorizationDecision {
    match (tx.kind, tx.balance_after) {
        (TransactionKind::CardPayment, Some(balance)) if tx.is_completed() => {
            debug!(transaction = tx.id, "Replaying approved card payment");
            AuthorizationDecision::approved(balance, tx.currency, Some(tx.id))
        }
        _ => AuthorizationDecision::declined(DeclineReason::PreviouslyDeclined, requested),
    }
}
