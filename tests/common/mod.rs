#![allow(dead_code)]

use async_trait::async_trait;
use bankcore::application::BankServices;
use bankcore::config::{EngineConfig, FixedClock};
use bankcore::crypto::RandomSource;
use bankcore::domain::account::{Account, AccountId, NewAccount};
use bankcore::domain::card::{NewCard, StoredCard};
use bankcore::domain::credit::{
    Credit, CreditId, NewCredit, NewPaymentEntry, PaymentScheduleEntry,
};
use bankcore::domain::ports::{BankStore, BankStoreRef, StoreTransaction, TransactionBox};
use bankcore::error::{BankError, Result, StoreError, StoreResult};
use bankcore::infrastructure::in_memory::InMemoryBankStore;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

pub const CVV_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";
pub const PAN_KEY: &str = "1f1e1d1c1b1a191817161514131211100f0e0d0c0b0a09080706050403020100";
pub const OTHER_PAN_KEY: &str = "a0a1a2a3a4a5a6a7a8a9aaabacadaeafb0b1b2b3b4b5b6b7b8b9babbbcbdbebf";

pub fn config() -> EngineConfig {
    EngineConfig::from_hex_keys(CVV_KEY, PAN_KEY).unwrap()
}

pub fn issued_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 9, 30, 0).unwrap()
}

pub fn services_with(store: BankStoreRef, config: &EngineConfig) -> BankServices {
    BankServices::new(store, config)
        .unwrap()
        .with_clock(Arc::new(FixedClock(issued_at())))
}

pub fn services() -> BankServices {
    services_with(Arc::new(InMemoryBankStore::new()), &config())
}

/// Opens an account for `owner` and funds it with `balance`.
pub async fn funded_account(services: &BankServices, owner: &str, balance: Decimal) -> Account {
    let account = services.ledger.create_account(owner, "USD").await.unwrap();
    if balance > Decimal::ZERO {
        services.ledger.deposit(account.id, balance).await.unwrap();
    }
    services.ledger.get_account(account.id).await.unwrap()
}

/// Replays a fixed byte sequence, wrapping around.
pub struct ReplayRandom {
    bytes: Vec<u8>,
    position: Mutex<usize>,
}

impl ReplayRandom {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            position: Mutex::new(0),
        }
    }
}

impl RandomSource for ReplayRandom {
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<()> {
        let mut position = self.position.lock().unwrap();
        for byte in dest.iter_mut() {
            *byte = self.bytes[*position % self.bytes.len()];
            *position += 1;
        }
        Ok(())
    }
}

/// A random source that is always unavailable.
pub struct BrokenRandom;

impl RandomSource for BrokenRandom {
    fn fill_bytes(&self, _dest: &mut [u8]) -> Result<()> {
        Err(BankError::Generation("entropy source unavailable".to_string()))
    }
}

/// Wraps the in-memory store; transactions fail their payment-row insert
/// once `payments_before_failure` rows have been inserted.
pub struct FlakyStore {
    inner: InMemoryBankStore,
    payments_before_failure: usize,
}

impl FlakyStore {
    pub fn new(payments_before_failure: usize) -> Self {
        Self {
            inner: InMemoryBankStore::new(),
            payments_before_failure,
        }
    }
}

struct FlakyTransaction {
    inner: TransactionBox,
    remaining: usize,
}

#[async_trait]
impl StoreTransaction for FlakyTransaction {
    async fn lock_account(&mut self, id: AccountId) -> StoreResult<Option<Account>> {
        self.inner.lock_account(id).await
    }

    async fn update_account_balance(&mut self, id: AccountId, delta: Decimal) -> StoreResult<()> {
        self.inner.update_account_balance(id, delta).await
    }

    async fn insert_credit(&mut self, credit: NewCredit) -> StoreResult<Credit> {
        self.inner.insert_credit(credit).await
    }

    async fn insert_payment(&mut self, entry: NewPaymentEntry) -> StoreResult<PaymentScheduleEntry> {
        if self.remaining == 0 {
            return Err(StoreError::Backend("disk full".to_string()));
        }
        self.remaining -= 1;
        self.inner.insert_payment(entry).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.inner.rollback().await
    }
}

#[async_trait]
impl BankStore for FlakyStore {
    async fn begin(&self) -> StoreResult<TransactionBox> {
        Ok(Box::new(FlakyTransaction {
            inner: self.inner.begin().await?,
            remaining: self.payments_before_failure,
        }))
    }

    async fn create_account(&self, account: NewAccount) -> StoreResult<Account> {
        self.inner.create_account(account).await
    }

    async fn get_account(&self, id: AccountId) -> StoreResult<Option<Account>> {
        self.inner.get_account(id).await
    }

    async fn accounts_by_owner(&self, owner: &str) -> StoreResult<Vec<Account>> {
        self.inner.accounts_by_owner(owner).await
    }

    async fn all_accounts(&self) -> StoreResult<Vec<Account>> {
        self.inner.all_accounts().await
    }

    async fn set_account_active(&self, id: AccountId, active: bool) -> StoreResult<()> {
        self.inner.set_account_active(id, active).await
    }

    async fn create_card(&self, card: NewCard) -> StoreResult<StoredCard> {
        self.inner.create_card(card).await
    }

    async fn cards_by_account(&self, account_id: AccountId) -> StoreResult<Vec<StoredCard>> {
        self.inner.cards_by_account(account_id).await
    }

    async fn get_credit(&self, id: CreditId) -> StoreResult<Option<Credit>> {
        self.inner.get_credit(id).await
    }

    async fn payment_schedule(&self, credit_id: CreditId) -> StoreResult<Vec<PaymentScheduleEntry>> {
        self.inner.payment_schedule(credit_id).await
    }
}

/// Writes a command script with `accounts` open rows followed by one deposit
/// per account.
pub fn generate_script(path: &Path, accounts: usize) -> std::result::Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);
    wtr.write_record(["op", "owner", "account", "target", "amount", "currency", "rate", "term"])?;

    for i in 1..=accounts {
        wtr.write_record([
            "open",
            format!("user{i}").as_str(),
            "",
            "",
            "",
            "USD",
            "",
            "",
        ])?;
    }
    for i in 1..=accounts {
        wtr.write_record(["deposit", "", i.to_string().as_str(), "", "10.0", "", "", ""])?;
    }

    wtr.flush()?;
    Ok(())
}
