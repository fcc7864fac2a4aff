use super::account::{Account, AccountId, NewAccount};
use super::card::{NewCard, StoredCard};
use super::credit::{Credit, CreditId, NewCredit, NewPaymentEntry, PaymentScheduleEntry};
use crate::error::StoreResult;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Storage gateway used by the engines.
///
/// Plain reads and single-row inserts go straight through the store. Anything
/// that must be atomic, or that reads a balance before changing it, runs
/// inside a [`StoreTransaction`] obtained from [`BankStore::begin`].
#[async_trait]
pub trait BankStore: Send + Sync {
    async fn begin(&self) -> StoreResult<TransactionBox>;

    async fn create_account(&self, account: NewAccount) -> StoreResult<Account>;
    async fn get_account(&self, id: AccountId) -> StoreResult<Option<Account>>;
    async fn accounts_by_owner(&self, owner: &str) -> StoreResult<Vec<Account>>;
    async fn all_accounts(&self) -> StoreResult<Vec<Account>>;
    async fn set_account_active(&self, id: AccountId, active: bool) -> StoreResult<()>;

    async fn create_card(&self, card: NewCard) -> StoreResult<StoredCard>;
    async fn cards_by_account(&self, account_id: AccountId) -> StoreResult<Vec<StoredCard>>;

    async fn get_credit(&self, id: CreditId) -> StoreResult<Option<Credit>>;
    /// Schedule rows of a credit ordered by sequence number.
    async fn payment_schedule(&self, credit_id: CreditId) -> StoreResult<Vec<PaymentScheduleEntry>>;
}

/// A unit of work against the store.
///
/// Account rows touched through the handle stay locked until it is committed,
/// rolled back or dropped. Writes are buffered and become visible together on
/// [`commit`](StoreTransaction::commit); dropping the handle without
/// committing discards them.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Locks the account row and returns it as seen by this transaction,
    /// including its own uncommitted balance changes.
    async fn lock_account(&mut self, id: AccountId) -> StoreResult<Option<Account>>;
    /// Adds a signed delta to the account balance.
    async fn update_account_balance(&mut self, id: AccountId, delta: Decimal) -> StoreResult<()>;
    async fn insert_credit(&mut self, credit: NewCredit) -> StoreResult<Credit>;
    async fn insert_payment(&mut self, entry: NewPaymentEntry) -> StoreResult<PaymentScheduleEntry>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

pub type BankStoreRef = Arc<dyn BankStore>;
pub type TransactionBox = Box<dyn StoreTransaction>;
