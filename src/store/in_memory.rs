use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
};

use chrono::{DateTime, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use parking_lot::{Mutex, RawMutex, lock_api::ArcMutexGuard};
use rust_decimal::Decimal;
use tracing::debug;

use crate::{
    account::{Account, AccountId, BalanceEvent, Card, CardKind, CardStatus, mask_card_number},
    currency::Currency,
    error::LedgerError,
    transaction::{NewTransaction, Transaction, TransactionFilter, TransactionId},
};

use super::{AccountDirectory, BalanceStore, LedgerStore, TransactionLedger, UnitOfWork};

type AccountHandle = Arc<Mutex<Account>>;
type AccountGuard = ArcMutexGuard<RawMutex, Account>;

#[derive(Default)]
struct LedgerTable {
    rows: Vec<Transaction>,
    by_reference: HashMap<String, usize>,
}

impl LedgerTable {
    fn check_reference(&self, reference: Option<&str>) -> Result<(), LedgerError> {
        match reference {
            Some(reference) if self.by_reference.contains_key(reference) => {
                Err(LedgerError::DuplicateReference(reference.to_string()))
            }
            _ => Ok(()),
        }
    }

    fn append(&mut self, transaction: NewTransaction, created_at: DateTime<Utc>) -> Transaction {
        let id = self.rows.len() as TransactionId + 1;
        let row = Transaction::from_new(id, transaction, created_at);
        if let Some(reference) = &row.reference {
            self.by_reference.insert(reference.clone(), self.rows.len());
        }
        self.rows.push(row.clone());
        row
    }
}

/// Process-local store. Accounts are locked individually, the ledger table
/// has one lock that is always taken after any account locks.
#[derive(Default)]
pub struct InMemoryStore {
    accounts: DashMap<AccountId, AccountHandle>,
    cards: DashMap<String, Card>,
    last_card_id: AtomicU32,
    ledger: Mutex<LedgerTable>,
    offline: AtomicBool,
    fail_next_commit: AtomicBool,
}

impl InMemoryStore {
    /// Registers an account with zero balances. Returns `false` if the id is
    /// already taken.
    pub fn open_account(&self, id: AccountId) -> bool {
        match self.accounts.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(Mutex::new(Account::new(id))));
                true
            }
        }
    }

    /// Issues an active card. Re-issuing a number replaces the previous card.
    pub fn issue_card(
        &self,
        account: AccountId,
        number: impl Into<String>,
        kind: CardKind,
    ) -> Result<Card, LedgerError> {
        if !self.accounts.contains_key(&account) {
            return Err(LedgerError::AccountNotFound(account));
        }
        let card = Card {
            id: self.last_card_id.fetch_add(1, Ordering::SeqCst) + 1,
            account,
            number: number.into(),
            kind,
            status: CardStatus::Active,
        };
        self.cards.insert(card.number.clone(), card.clone());
        Ok(card)
    }

    pub fn set_card_status(&self, number: &str, status: CardStatus) -> Result<Card, LedgerError> {
        let mut card = self
            .cards
            .get_mut(number)
            .ok_or_else(|| LedgerError::CardNotFound(mask_card_number(number)))?;
        card.status = status;
        Ok(card.clone())
    }

    /// Snapshot of every account, ordered by id.
    pub fn accounts(&self) -> Vec<Account> {
        let handles: Vec<AccountHandle> = self
            .accounts
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut accounts: Vec<Account> = handles.iter().map(|h| h.lock().clone()).collect();
        accounts.sort_by_key(Account::id);
        accounts
    }

    /// Simulates the backing store going away: every operation fails with
    /// [`LedgerError::StoreUnavailable`] until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Simulates a failure of the next commit, after balances were already
    /// changed inside the unit.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), LedgerError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(LedgerError::StoreUnavailable("store is offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn handle(&self, id: AccountId) -> Result<AccountHandle, LedgerError> {
        self.accounts
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(LedgerError::AccountNotFound(id))
    }
}

pub struct InMemoryUnit<'s> {
    store: &'s InMemoryStore,
    guards: Vec<AccountGuard>,
    applied: Vec<BalanceEvent>,
    staged: Vec<NewTransaction>,
    committed: bool,
}

impl InMemoryUnit<'_> {
    /// Accounts outside the locked set are reported as not found.
    fn account_mut(&mut self, id: AccountId) -> Result<&mut Account, LedgerError> {
        self.guards
            .iter_mut()
            .map(|guard| &mut **guard)
            .find(|account| account.id() == id)
            .ok_or(LedgerError::AccountNotFound(id))
    }
}

impl UnitOfWork for InMemoryUnit<'_> {
    fn balance(&self, account: AccountId, currency: Currency) -> Result<Decimal, LedgerError> {
        self.guards
            .iter()
            .find(|guard| guard.id() == account)
            .map(|guard| guard.balance(currency))
            .ok_or(LedgerError::AccountNotFound(account))
    }

    fn debit(
        &mut self,
        account: AccountId,
        currency: Currency,
        amount: Decimal,
    ) -> Result<Decimal, LedgerError> {
        let acc = self.account_mut(account)?;
        let event = acc.handle_debit(currency, amount)?;
        acc.apply(&event);
        let balance = acc.balance(currency);
        self.applied.push(event);
        Ok(balance)
    }

    fn credit(
        &mut self,
        account: AccountId,
        currency: Currency,
        amount: Decimal,
    ) -> Result<Decimal, LedgerError> {
        let acc = self.account_mut(account)?;
        let event = acc.handle_credit(currency, amount)?;
        acc.apply(&event);
        let balance = acc.balance(currency);
        self.applied.push(event);
        Ok(balance)
    }

    fn record(&mut self, transaction: NewTransaction) {
        self.staged.push(transaction);
    }

    fn commit(mut self) -> Result<Vec<Transaction>, LedgerError> {
        self.store.ensure_online()?;
        let mut ledger = self.store.ledger.lock();

        let mut seen = HashSet::new();
        for tx in &self.staged {
            if let Some(reference) = tx.reference.as_deref() {
                ledger.check_reference(Some(reference))?;
                if !seen.insert(reference) {
                    return Err(LedgerError::DuplicateReference(reference.to_string()));
                }
            }
        }

        if self.store.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(LedgerError::StoreUnavailable(
                "commit was interrupted".to_string(),
            ));
        }

        let created_at = Utc::now();
        let recorded = self
            .staged
            .drain(..)
            .map(|tx| ledger.append(tx, created_at))
            .collect();
        self.committed = true;
        Ok(recorded)
    }
}

impl Drop for InMemoryUnit<'_> {
    fn drop(&mut self) {
        if self.committed || self.applied.is_empty() {
            return;
        }
        for event in self.applied.iter().rev() {
            if let Some(guard) = self
                .guards
                .iter_mut()
                .find(|guard| guard.id() == event.account())
            {
                guard.revert(event);
            }
        }
        debug!(events = self.applied.len(), "Rolled back uncommitted unit of work");
    }
}

impl LedgerStore for InMemoryStore {
    type Unit<'s> = InMemoryUnit<'s>;

    fn begin(&self, accounts: &[AccountId]) -> Result<InMemoryUnit<'_>, LedgerError> {
        self.ensure_online()?;
        let mut ids = accounts.to_vec();
        ids.sort_unstable();
        ids.dedup();
        let handles = ids
            .into_iter()
            .map(|id| self.handle(id))
            .collect::<Result<Vec<_>, _>>()?;
        // ascending id order, so two units never wait on each other in a cycle
        let guards = handles.into_iter().map(|handle| handle.lock_arc()).collect();
        Ok(InMemoryUnit {
            store: self,
            guards,
            applied: Vec::new(),
            staged: Vec::new(),
            committed: false,
        })
    }
}

impl BalanceStore for InMemoryStore {
    fn read(&self, account: AccountId, currency: Currency) -> Result<Decimal, LedgerError> {
        self.ensure_online()?;
        let handle = self.handle(account)?;
        let balance = handle.lock().balance(currency);
        Ok(balance)
    }

    fn debit(
        &self,
        account: AccountId,
        currency: Currency,
        amount: Decimal,
    ) -> Result<Decimal, LedgerError> {
        let mut unit = self.begin(&[account])?;
        let balance = unit.debit(account, currency, amount)?;
        unit.commit()?;
        Ok(balance)
    }

    fn credit(
        &self,
        account: AccountId,
        currency: Currency,
        amount: Decimal,
    ) -> Result<Decimal, LedgerError> {
        let mut unit = self.begin(&[account])?;
        let balance = unit.credit(account, currency, amount)?;
        unit.commit()?;
        Ok(balance)
    }
}

impl TransactionLedger for InMemoryStore {
    fn record(&self, transaction: NewTransaction) -> Result<Transaction, LedgerError> {
        self.ensure_online()?;
        let mut ledger = self.ledger.lock();
        ledger.check_reference(transaction.reference.as_deref())?;
        Ok(ledger.append(transaction, Utc::now()))
    }

    fn query(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, LedgerError> {
        self.ensure_online()?;
        let ledger = self.ledger.lock();
        let limit = filter.limit.unwrap_or(usize::MAX);
        if let Some(reference) = &filter.reference {
            return Ok(ledger
                .by_reference
                .get(reference)
                .map(|&pos| &ledger.rows[pos])
                .filter(|tx| filter.matches(tx))
                .into_iter()
                .take(limit)
                .cloned()
                .collect());
        }
        // rows are appended in commit order, newest last
        Ok(ledger
            .rows
            .iter()
            .rev()
            .filter(|tx| filter.matches(tx))
            .take(limit)
            .cloned()
            .collect())
    }
}

impl AccountDirectory for InMemoryStore {
    fn account_by_id(&self, id: AccountId) -> Result<Option<Account>, LedgerError> {
        self.ensure_online()?;
        Ok(self.accounts.get(&id).map(|entry| entry.value().lock().clone()))
    }

    fn card_by_number(&self, number: &str) -> Result<Option<Card>, LedgerError> {
        self.ensure_online()?;
        Ok(self.cards.get(number).map(|entry| entry.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Barrier, thread};

    use rust_decimal_macros::dec;

    use crate::{
        account::BalanceError,
        transaction::{TransactionKind, TransactionStatus},
    };

    use super::*;

    fn store_with_accounts(ids: &[AccountId]) -> InMemoryStore {
        let store = InMemoryStore::default();
        for id in ids {
            assert!(store.open_account(*id));
        }
        store
    }

    #[test]
    fn balance_primitives() {
        let store = store_with_accounts(&[1]);
        assert!(!store.open_account(1));

        assert_eq!(store.read(1, Currency::Usd).unwrap(), Decimal::ZERO);
        assert_eq!(store.credit(1, Currency::Usd, dec!(100.00)).unwrap(), dec!(100.00));
        assert_eq!(store.debit(1, Currency::Usd, dec!(40.00)).unwrap(), dec!(60.00));
        assert_eq!(store.read(1, Currency::Lbp).unwrap(), Decimal::ZERO);

        let err = store.debit(1, Currency::Usd, dec!(60.01)).unwrap_err();
        assert_eq!(
            err,
            LedgerError::Balance(BalanceError::InsufficientFunds {
                account: 1,
                currency: Currency::Usd
            })
        );
        assert!(matches!(
            store.credit(1, Currency::Usd, dec!(0)),
            Err(LedgerError::Balance(BalanceError::InvalidAmount { .. }))
        ));
        assert_eq!(store.read(1, Currency::Usd).unwrap(), dec!(60.00));

        assert_eq!(
            store.credit(2, Currency::Usd, dec!(1)).unwrap_err(),
            LedgerError::AccountNotFound(2)
        );
    }

    #[test]
    fn dropped_unit_rolls_back() {
        let store = store_with_accounts(&[1, 2]);
        store.credit(1, Currency::Usd, dec!(100)).unwrap();
        {
            let mut unit = store.begin(&[2, 1]).unwrap();
            assert_eq!(unit.debit(1, Currency::Usd, dec!(30)).unwrap(), dec!(70));
            assert_eq!(unit.credit(2, Currency::Usd, dec!(30)).unwrap(), dec!(30));
            assert_eq!(unit.balance(2, Currency::Usd).unwrap(), dec!(30));
            assert_eq!(
                unit.balance(3, Currency::Usd).unwrap_err(),
                LedgerError::AccountNotFound(3)
            );
        }
        assert_eq!(store.read(1, Currency::Usd).unwrap(), dec!(100));
        assert_eq!(store.read(2, Currency::Usd).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn failed_commit_rolls_back() {
        let store = store_with_accounts(&[1]);
        store.fail_next_commit();
        let mut unit = store.begin(&[1]).unwrap();
        unit.credit(1, Currency::Lbp, dec!(1000)).unwrap();
        unit.record(NewTransaction::top_up(1, dec!(1000), Currency::Lbp, None, dec!(1000)));
        assert!(unit.commit().unwrap_err().is_retryable());

        assert_eq!(store.read(1, Currency::Lbp).unwrap(), Decimal::ZERO);
        assert!(store.query(&TransactionFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn duplicate_reference_is_rejected() {
        let store = store_with_accounts(&[1]);
        let tx = NewTransaction::top_up(1, dec!(5), Currency::Usd, Some("ref-1".into()), dec!(5));
        let first = store.record(tx.clone()).unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(
            store.record(tx.clone()).unwrap_err(),
            LedgerError::DuplicateReference("ref-1".to_string())
        );

        // same rule applies inside a unit, and the balance change is undone
        let mut unit = store.begin(&[1]).unwrap();
        unit.credit(1, Currency::Usd, dec!(5)).unwrap();
        unit.record(tx);
        assert!(matches!(unit.commit(), Err(LedgerError::DuplicateReference(_))));
        assert_eq!(store.read(1, Currency::Usd).unwrap(), Decimal::ZERO);

        // rows without a reference never collide
        store
            .record(NewTransaction::top_up(1, dec!(5), Currency::Usd, None, dec!(5)))
            .unwrap();
        store
            .record(NewTransaction::top_up(1, dec!(5), Currency::Usd, None, dec!(5)))
            .unwrap();
        assert_eq!(store.query(&TransactionFilter::default()).unwrap().len(), 3);
    }

    #[test]
    fn query_newest_first() {
        let store = store_with_accounts(&[1, 2]);
        store
            .record(NewTransaction::top_up(1, dec!(10), Currency::Usd, None, dec!(10)))
            .unwrap();
        store
            .record(NewTransaction::p2p(1, 2, dec!(4), Currency::Usd, Some("p".into()), dec!(6)))
            .unwrap();
        store
            .record(NewTransaction::declined_card_payment(Some(2), None, dec!(1), Currency::Lbp, None))
            .unwrap();

        let history = store.query(&TransactionFilter::by_account(2)).unwrap();
        assert_eq!(history.iter().map(|tx| tx.id).collect::<Vec<_>>(), vec![3, 2]);

        let latest = store
            .query(&TransactionFilter::by_account(1).with_limit(1))
            .unwrap();
        assert_eq!(latest[0].kind, TransactionKind::P2p);

        let found = store.find_by_reference("p").unwrap().unwrap();
        assert_eq!(found.status, TransactionStatus::Completed);
        assert!(store.find_by_reference("missing").unwrap().is_none());
        assert!(
            store
                .query(&TransactionFilter::by_reference("p").with_kind(TransactionKind::TopUp))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn cards() {
        let store = store_with_accounts(&[1]);
        assert_eq!(
            store
                .issue_card(9, "545454******5454", CardKind::Virtual)
                .unwrap_err(),
            LedgerError::AccountNotFound(9)
        );
        let card = store
            .issue_card(1, "545454******5454", CardKind::Virtual)
            .unwrap();
        assert_eq!(card.status, CardStatus::Active);
        assert_eq!(store.card_by_number("545454******5454").unwrap(), Some(card));
        assert_eq!(store.account_by_id(1).unwrap().map(|acc| acc.id()), Some(1));
        assert!(store.account_by_id(9).unwrap().is_none());

        let frozen = store
            .set_card_status("545454******5454", CardStatus::Frozen)
            .unwrap();
        assert_eq!(frozen.status, CardStatus::Frozen);
        assert_eq!(
            store
                .set_card_status("4242424242424242", CardStatus::Active)
                .unwrap_err(),
            LedgerError::CardNotFound("************4242".to_string())
        );
    }

    #[test]
    fn offline_store() {
        let store = store_with_accounts(&[1]);
        store.set_offline(true);
        assert!(store.read(1, Currency::Usd).unwrap_err().is_retryable());
        assert!(store.begin(&[1]).is_err());
        assert!(store.card_by_number("x").is_err());
        store.set_offline(false);
        assert!(store.read(1, Currency::Usd).is_ok());
    }

    #[test]
    fn concurrent_debits_single_winner() {
        const THREADS: usize = 16;
        let store = store_with_accounts(&[1]);
        store.credit(1, Currency::Usd, dec!(100)).unwrap();
        let barrier = Barrier::new(THREADS);

        let results: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        store.debit(1, Currency::Usd, dec!(100))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().filter_map(|r| r.as_ref().err()).all(|err| matches!(
            err,
            LedgerError::Balance(BalanceError::InsufficientFunds { .. })
        )));
        assert_eq!(store.read(1, Currency::Usd).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn opposite_transfers_do_not_deadlock() {
        let store = store_with_accounts(&[1, 2]);
        store.credit(1, Currency::Usd, dec!(1000)).unwrap();
        store.credit(2, Currency::Usd, dec!(1000)).unwrap();

        thread::scope(|s| {
            for (from, to) in [(1, 2), (2, 1)] {
                let store = &store;
                s.spawn(move || {
                    for _ in 0..200 {
                        let mut unit = store.begin(&[from, to]).unwrap();
                        unit.debit(from, Currency::Usd, dec!(1)).unwrap();
                        unit.credit(to, Currency::Usd, dec!(1)).unwrap();
                        unit.commit().unwrap();
                    }
                });
            }
        });

        let total = store.read(1, Currency::Usd).unwrap() + store.read(2, Currency::Usd).unwrap();
        assert_eq!(total, dec!(2000));
    }
}
