use std::sync::Arc;

use rust_decimal::Decimal;

use crate::{
    account::AccountId,
    authorization::CardAuthorizer,
    config::LedgerConfig,
    currency::Currency,
    error::LedgerError,
    idempotency::IdempotencyResolver,
    store::LedgerStore,
    transaction::{Transaction, TransactionFilter},
    transfer::TransferEngine,
};

/// Both engines over one store. They share the idempotency resolver, so a
/// reference is serialized no matter which flow it arrives through.
pub struct Wallet<S> {
    store: Arc<S>,
    transfers: TransferEngine<S>,
    cards: CardAuthorizer<S>,
}

impl<S> Wallet<S>
where
    S: LedgerStore,
{
    pub fn new(store: Arc<S>, config: &LedgerConfig) -> Self {
        let idempotency = Arc::new(IdempotencyResolver::new(store.clone()));
        Self {
            transfers: TransferEngine::new(store.clone(), idempotency.clone()),
            cards: CardAuthorizer::new(store.clone(), idempotency, config),
            store,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn transfers(&self) -> &TransferEngine<S> {
        &self.transfers
    }

    pub fn cards(&self) -> &CardAuthorizer<S> {
        &self.cards
    }

    pub fn balance(&self, account: AccountId, currency: Currency) -> Result<Decimal, LedgerError> {
        self.store.read(account, currency)
    }

    /// Everything the account sent or received, newest first.
    pub fn history(
        &self,
        account: AccountId,
        limit: Option<usize>,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let filter = TransactionFilter {
            limit,
            ..TransactionFilter::by_account(account)
        };
        self.store.query(&filter)
    }
}
