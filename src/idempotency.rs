use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::{
    command::normalize_reference,
    error::LedgerError,
    store::TransactionLedger,
    transaction::Transaction,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T> {
    /// The operation ran for this request.
    Fresh(T),
    /// A completed row already holds this reference.
    Replayed(Transaction),
    /// A row holds this reference, but it never completed.
    PreviouslyDeclined(Transaction),
}

impl<T> Resolution<T> {
    fn from_existing(tx: Transaction) -> Self {
        if tx.is_completed() {
            Resolution::Replayed(tx)
        } else {
            Resolution::PreviouslyDeclined(tx)
        }
    }
}

/// Serializes requests per idempotency key and replays recorded outcomes.
///
/// Two layers keep a key from executing twice: a lock per key for requests
/// racing inside this process, and the ledger uniqueness constraint for
/// anything that slips past it.
pub struct IdempotencyResolver<L> {
    ledger: Arc<L>,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
}

impl<L> IdempotencyResolver<L>
where
    L: TransactionLedger,
{
    pub fn new(ledger: Arc<L>) -> Self {
        Self {
            ledger,
            in_flight: DashMap::new(),
        }
    }

    /// The operation is expected to record its outcome under `key`.
    pub fn resolve_or_execute<T, F>(
        &self,
        key: Option<&str>,
        operation: F,
    ) -> Result<Resolution<T>, LedgerError>
    where
        F: FnOnce() -> Result<T, LedgerError>,
    {
        let Some(key) = normalize_reference(key) else {
            return operation().map(Resolution::Fresh);
        };

        let slot = self.in_flight.entry(key.clone()).or_default().value().clone();
        let guard = slot.lock();
        let resolution = self.resolve_locked(&key, operation);
        drop(guard);

        // map entry plus our clone means nobody else holds or waits on it
        self.in_flight
            .remove_if(&key, |_, slot| Arc::strong_count(slot) == 2);
        resolution
    }

    fn resolve_locked<T, F>(&self, key: &str, operation: F) -> Result<Resolution<T>, LedgerError>
    where
        F: FnOnce() -> Result<T, LedgerError>,
    {
        if let Some(existing) = self.ledger.find_by_reference(key)? {
            debug!(reference = key, status = ?existing.status, "Replaying recorded outcome");
            return Ok(Resolution::from_existing(existing));
        }
        match operation() {
            Ok(fresh) => Ok(Resolution::Fresh(fresh)),
            Err(LedgerError::DuplicateReference(reference)) => {
                debug!(reference, "Lost the race on reference, replaying the winner");
                self.ledger
                    .find_by_reference(key)?
                    .map(Resolution::from_existing)
                    .ok_or(LedgerError::DuplicateReference(reference))
            }
            Err(err) => Err(err),
        }
    }

    #[cfg(test)]
    fn in_flight_keys(&self) -> usize {
        self.in_flight.len()
    }
}
