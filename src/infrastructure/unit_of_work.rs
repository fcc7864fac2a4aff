//! Transaction machinery shared by the storage backends.
//!
//! A [`UnitOfWork`] takes per-account row locks as it goes, buffers its writes
//! in a [`PendingWrites`] set and hands that set to the backend's
//! [`CommitTarget::apply`] on commit. The backend validates and applies the
//! whole set or none of it.

use crate::domain::account::{Account, AccountId};
use crate::domain::credit::{Credit, CreditId, NewCredit, NewPaymentEntry, PaymentScheduleEntry};
use crate::domain::ports::StoreTransaction;
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Per-account async locks. A guard is held by the transaction that locked
/// the row until that transaction finishes.
///
/// An entry lives only while some task holds or waits for it, so probing
/// unknown ids leaves nothing behind.
#[derive(Default, Clone)]
pub struct RowLocks {
    rows: Arc<StdMutex<HashMap<AccountId, Arc<Mutex<()>>>>>,
}

impl RowLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, id: AccountId) -> RowGuard {
        let row = self.table().entry(id).or_default().clone();
        RowGuard {
            rows: self.rows.clone(),
            guard: Some(row.lock_owned().await),
        }
    }

    /// Number of rows currently locked or awaited.
    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn table(&self) -> MutexGuard<'_, HashMap<AccountId, Arc<Mutex<()>>>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds one row lock. Dropping it evicts every entry nobody holds or awaits
/// any more, including rows left behind by cancelled waiters.
pub struct RowGuard {
    rows: Arc<StdMutex<HashMap<AccountId, Arc<Mutex<()>>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RowGuard {
    fn drop(&mut self) {
        // The owned guard keeps one reference to the row; release it first.
        drop(self.guard.take());
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        rows.retain(|_, row| Arc::strong_count(row) > 1);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sequence {
    Account,
    Card,
    Credit,
    Payment,
}

/// Id generators, one per table. Ids handed to a transaction that later
/// rolls back are not reused.
#[derive(Debug, Default)]
pub struct Sequences {
    account: AtomicI64,
    card: AtomicI64,
    credit: AtomicI64,
    payment: AtomicI64,
}

impl Sequences {
    fn counter(&self, sequence: Sequence) -> &AtomicI64 {
        match sequence {
            Sequence::Account => &self.account,
            Sequence::Card => &self.card,
            Sequence::Credit => &self.credit,
            Sequence::Payment => &self.payment,
        }
    }

    pub fn next(&self, sequence: Sequence) -> i64 {
        self.counter(sequence).fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Ensures the next id handed out is greater than `last_used`.
    pub fn advance_past(&self, sequence: Sequence, last_used: i64) {
        self.counter(sequence).fetch_max(last_used, Ordering::SeqCst);
    }
}

/// Writes buffered by an open transaction.
#[derive(Debug, Default)]
pub struct PendingWrites {
    pub balance_deltas: BTreeMap<AccountId, Decimal>,
    pub credits: Vec<Credit>,
    pub payments: Vec<PaymentScheduleEntry>,
}

impl PendingWrites {
    pub fn is_empty(&self) -> bool {
        self.balance_deltas.is_empty() && self.credits.is_empty() && self.payments.is_empty()
    }

    fn has_credit(&self, id: CreditId) -> bool {
        self.credits.iter().any(|credit| credit.id == id)
    }
}

/// Applies each buffered delta to a copy of the committed account and checks
/// the result, without touching any state.
pub fn validate_balances<F>(writes: &PendingWrites, mut load: F) -> StoreResult<Vec<Account>>
where
    F: FnMut(AccountId) -> StoreResult<Option<Account>>,
{
    writes
        .balance_deltas
        .iter()
        .map(|(&id, &delta)| {
            let mut account = load(id)?.ok_or(StoreError::MissingAccount(id))?;
            account.balance = account
                .balance
                .checked_add(delta)
                .ok_or(StoreError::BalanceOverflow(id))?;
            if account.balance.is_negative() {
                return Err(StoreError::NegativeBalance(id));
            }
            Ok(account)
        })
        .collect()
}

/// The backend side of a transaction.
#[async_trait]
pub trait CommitTarget: Send + Sync + 'static {
    fn row_locks(&self) -> &RowLocks;
    fn next_id(&self, sequence: Sequence) -> i64;
    async fn load_account(&self, id: AccountId) -> StoreResult<Option<Account>>;
    async fn credit_exists(&self, id: CreditId) -> StoreResult<bool>;
    /// Validates and applies every write, or none of them.
    async fn apply(&self, writes: PendingWrites) -> StoreResult<()>;
}

pub struct UnitOfWork<T: CommitTarget> {
    target: Arc<T>,
    held: HashMap<AccountId, RowGuard>,
    writes: PendingWrites,
    finished: bool,
}

impl<T: CommitTarget> UnitOfWork<T> {
    pub fn new(target: Arc<T>) -> Self {
        Self {
            target,
            held: HashMap::new(),
            writes: PendingWrites::default(),
            finished: false,
        }
    }

    async fn lock_row(&mut self, id: AccountId) {
        if !self.held.contains_key(&id) {
            let guard = self.target.row_locks().acquire(id).await;
            self.held.insert(id, guard);
        }
    }
}

#[async_trait]
impl<T: CommitTarget> StoreTransaction for UnitOfWork<T> {
    async fn lock_account(&mut self, id: AccountId) -> StoreResult<Option<Account>> {
        self.lock_row(id).await;
        let Some(mut account) = self.target.load_account(id).await? else {
            return Ok(None);
        };
        if let Some(delta) = self.writes.balance_deltas.get(&id) {
            account.balance = account
                .balance
                .checked_add(*delta)
                .ok_or(StoreError::BalanceOverflow(id))?;
        }
        Ok(Some(account))
    }

    async fn update_account_balance(&mut self, id: AccountId, delta: Decimal) -> StoreResult<()> {
        self.lock_row(id).await;
        if self.target.load_account(id).await?.is_none() {
            return Err(StoreError::MissingAccount(id));
        }
        let pending = self.writes.balance_deltas.entry(id).or_default();
        *pending = pending
            .checked_add(delta)
            .ok_or(StoreError::BalanceOverflow(id))?;
        Ok(())
    }

    async fn insert_credit(&mut self, credit: NewCredit) -> StoreResult<Credit> {
        let credit = Credit::from_new(self.target.next_id(Sequence::Credit), credit);
        self.writes.credits.push(credit.clone());
        Ok(credit)
    }

    async fn insert_payment(&mut self, entry: NewPaymentEntry) -> StoreResult<PaymentScheduleEntry> {
        if !self.writes.has_credit(entry.credit_id)
            && !self.target.credit_exists(entry.credit_id).await?
        {
            return Err(StoreError::MissingCredit(entry.credit_id));
        }
        let entry = PaymentScheduleEntry::from_new(self.target.next_id(Sequence::Payment), entry);
        self.writes.payments.push(entry.clone());
        Ok(entry)
    }

    async fn commit(mut self: Box<Self>) -> StoreResult<()> {
        self.finished = true;
        let writes = std::mem::take(&mut self.writes);
        self.target.apply(writes).await
    }

    async fn rollback(mut self: Box<Self>) -> StoreResult<()> {
        self.finished = true;
        debug!(
            locked_rows = self.held.len(),
            "rolling back transaction, discarding pending writes"
        );
        Ok(())
    }
}

impl<T: CommitTarget> Drop for UnitOfWork<T> {
    fn drop(&mut self) {
        if !self.finished && !self.writes.is_empty() {
            debug!("transaction dropped without commit, discarding pending writes");
        }
    }
}
