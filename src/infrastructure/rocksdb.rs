use super::unit_of_work::{
    CommitTarget, PendingWrites, RowLocks, Sequence, Sequences, UnitOfWork, validate_balances,
};
use crate::domain::account::{Account, AccountId, NewAccount};
use crate::domain::card::{NewCard, StoredCard};
use crate::domain::credit::{Credit, CreditId, PaymentScheduleEntry};
use crate::domain::ports::{BankStore, TransactionBox};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Column Family for account rows.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family for card rows (PAN ciphertext only).
pub const CF_CARDS: &str = "cards";
/// Column Family for credit rows.
pub const CF_CREDITS: &str = "credits";
/// Column Family for payment schedule rows.
pub const CF_PAYMENTS: &str = "payments";

const COLUMN_FAMILIES: [&str; 4] = [CF_ACCOUNTS, CF_CARDS, CF_CREDITS, CF_PAYMENTS];

struct Inner {
    db: DB,
    locks: RowLocks,
    sequences: Sequences,
    /// Serializes commits so validation and the batch write see the same
    /// state.
    commit_lock: Mutex<()>,
}

/// A persistent storage gateway backed by RocksDB.
///
/// Every table lives in its own Column Family, keyed by the big-endian row
/// id, with rows stored as JSON. Commits are written as a single
/// `WriteBatch`, so a transaction's writes land together or not at all.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc`).
#[derive(Clone)]
pub struct RocksDBStore {
    inner: Arc<Inner>,
}

fn key(id: i64) -> [u8; 8] {
    id.to_be_bytes()
}

fn to_json<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at `path`, creating the column
    /// families on first use and resuming id sequences from the stored rows.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        let inner = Inner {
            db,
            locks: RowLocks::new(),
            sequences: Sequences::default(),
            commit_lock: Mutex::new(()),
        };
        for (cf, sequence) in [
            (CF_ACCOUNTS, Sequence::Account),
            (CF_CARDS, Sequence::Card),
            (CF_CREDITS, Sequence::Credit),
            (CF_PAYMENTS, Sequence::Payment),
        ] {
            if let Some(last) = inner.last_id(cf)? {
                inner.sequences.advance_past(sequence, last);
            }
        }
        debug!("opened RocksDB store");

        Ok(Self {
            inner: Arc::new(inner),
        })
    }
}

impl Inner {
    fn cf(&self, name: &str) -> StoreResult<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Backend(format!("column family '{name}' not found")))
    }

    fn get_row<T: DeserializeOwned>(&self, cf_name: &str, id: i64) -> StoreResult<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key(id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_row<T: Serialize>(&self, cf_name: &str, id: i64, row: &T) -> StoreResult<()> {
        let cf = self.cf(cf_name)?;
        self.db.put_cf(cf, key(id), to_json(row)?)?;
        Ok(())
    }

    /// Rows of a column family in id order, filtered by `keep`.
    fn scan_rows<T, F>(&self, cf_name: &str, mut keep: F) -> StoreResult<Vec<T>>
    where
        T: DeserializeOwned,
        F: FnMut(&T) -> bool,
    {
        let cf = self.cf(cf_name)?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let row: T = serde_json::from_slice(&value)?;
            if keep(&row) {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    fn last_id(&self, cf_name: &str) -> StoreResult<Option<i64>> {
        let cf = self.cf(cf_name)?;
        match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(item) => {
                let (key, _value) = item?;
                let bytes: [u8; 8] = key.as_ref().try_into().map_err(|_| {
                    StoreError::Backend(format!("malformed key in column family '{cf_name}'"))
                })?;
                Ok(Some(i64::from_be_bytes(bytes)))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CommitTarget for Inner {
    fn row_locks(&self) -> &RowLocks {
        &self.locks
    }

    fn next_id(&self, sequence: Sequence) -> i64 {
        self.sequences.next(sequence)
    }

    async fn load_account(&self, id: AccountId) -> StoreResult<Option<Account>> {
        self.get_row(CF_ACCOUNTS, id)
    }

    async fn credit_exists(&self, id: CreditId) -> StoreResult<bool> {
        let cf = self.cf(CF_CREDITS)?;
        Ok(self.db.get_pinned_cf(cf, key(id))?.is_some())
    }

    async fn apply(&self, writes: PendingWrites) -> StoreResult<()> {
        let _commit = self.commit_lock.lock().await;

        let updated = validate_balances(&writes, |id| self.get_row(CF_ACCOUNTS, id))?;
        for payment in &writes.payments {
            let known = writes.credits.iter().any(|c| c.id == payment.credit_id)
                || self.credit_exists(payment.credit_id).await?;
            if !known {
                return Err(StoreError::MissingCredit(payment.credit_id));
            }
        }

        let mut batch = WriteBatch::default();
        let accounts = self.cf(CF_ACCOUNTS)?;
        for account in &updated {
            batch.put_cf(accounts, key(account.id), to_json(account)?);
        }
        let credits = self.cf(CF_CREDITS)?;
        for credit in &writes.credits {
            batch.put_cf(credits, key(credit.id), to_json(credit)?);
        }
        let payments = self.cf(CF_PAYMENTS)?;
        for payment in &writes.payments {
            batch.put_cf(payments, key(payment.id), to_json(payment)?);
        }
        self.db.write(batch)?;
        Ok(())
    }
}

#[async_trait]
impl BankStore for RocksDBStore {
    async fn begin(&self) -> StoreResult<TransactionBox> {
        Ok(Box::new(UnitOfWork::new(self.inner.clone())))
    }

    async fn create_account(&self, account: NewAccount) -> StoreResult<Account> {
        let account = Account::open(self.inner.sequences.next(Sequence::Account), account);
        self.inner.put_row(CF_ACCOUNTS, account.id, &account)?;
        Ok(account)
    }

    async fn get_account(&self, id: AccountId) -> StoreResult<Option<Account>> {
        self.inner.get_row(CF_ACCOUNTS, id)
    }

    async fn accounts_by_owner(&self, owner: &str) -> StoreResult<Vec<Account>> {
        self.inner
            .scan_rows(CF_ACCOUNTS, |account: &Account| account.owner == owner)
    }

    async fn all_accounts(&self) -> StoreResult<Vec<Account>> {
        self.inner.scan_rows(CF_ACCOUNTS, |_: &Account| true)
    }

    async fn set_account_active(&self, id: AccountId, active: bool) -> StoreResult<()> {
        let _row = self.inner.locks.acquire(id).await;
        let _commit = self.inner.commit_lock.lock().await;
        let mut account: Account = self
            .inner
            .get_row(CF_ACCOUNTS, id)?
            .ok_or(StoreError::MissingAccount(id))?;
        account.active = active;
        self.inner.put_row(CF_ACCOUNTS, id, &account)
    }

    async fn create_card(&self, card: NewCard) -> StoreResult<StoredCard> {
        if self.get_account(card.account_id).await?.is_none() {
            return Err(StoreError::MissingAccount(card.account_id));
        }
        let card = StoredCard::from_new(self.inner.sequences.next(Sequence::Card), card);
        self.inner.put_row(CF_CARDS, card.id, &card)?;
        Ok(card)
    }

    async fn cards_by_account(&self, account_id: AccountId) -> StoreResult<Vec<StoredCard>> {
        self.inner
            .scan_rows(CF_CARDS, |card: &StoredCard| card.account_id == account_id)
    }

    async fn get_credit(&self, id: CreditId) -> StoreResult<Option<Credit>> {
        self.inner.get_row(CF_CREDITS, id)
    }

    async fn payment_schedule(&self, credit_id: CreditId) -> StoreResult<Vec<PaymentScheduleEntry>> {
        let mut schedule = self.inner.scan_rows(CF_PAYMENTS, |entry: &PaymentScheduleEntry| {
            entry.credit_id == credit_id
        })?;
        schedule.sort_by_key(|entry| entry.sequence);
        Ok(schedule)
    }
}
