use super::unit_of_work::{
    CommitTarget, PendingWrites, RowLocks, Sequence, Sequences, UnitOfWork, validate_balances,
};
use crate::domain::account::{Account, AccountId, NewAccount};
use crate::domain::card::{CardId, NewCard, StoredCard};
use crate::domain::credit::{Credit, CreditId, PaymentId, PaymentScheduleEntry};
use crate::domain::ports::{BankStore, TransactionBox};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    accounts: BTreeMap<AccountId, Account>,
    cards: BTreeMap<CardId, StoredCard>,
    credits: BTreeMap<CreditId, Credit>,
    payments: BTreeMap<PaymentId, PaymentScheduleEntry>,
}

#[derive(Default)]
struct Inner {
    tables: RwLock<Tables>,
    locks: RowLocks,
    sequences: Sequences,
}

/// A thread-safe in-memory storage gateway.
///
/// Uses `Arc<RwLock<..>>` tables shared by every clone. Transactions take
/// row locks and buffer their writes; commit applies the whole write set
/// under one table lock. Ideal for testing or when persistence is not
/// required.
#[derive(Default, Clone)]
pub struct InMemoryBankStore {
    inner: Arc<Inner>,
}

impl InMemoryBankStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
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
        Ok(self.tables.read().await.accounts.get(&id).cloned())
    }

    async fn credit_exists(&self, id: CreditId) -> StoreResult<bool> {
        Ok(self.tables.read().await.credits.contains_key(&id))
    }

    async fn apply(&self, writes: PendingWrites) -> StoreResult<()> {
        let mut tables = self.tables.write().await;

        let updated = validate_balances(&writes, |id| Ok(tables.accounts.get(&id).cloned()))?;
        for payment in &writes.payments {
            let known = tables.credits.contains_key(&payment.credit_id)
                || writes.credits.iter().any(|c| c.id == payment.credit_id);
            if !known {
                return Err(StoreError::MissingCredit(payment.credit_id));
            }
        }

        for account in updated {
            tables.accounts.insert(account.id, account);
        }
        for credit in writes.credits {
            tables.credits.insert(credit.id, credit);
        }
        for payment in writes.payments {
            tables.payments.insert(payment.id, payment);
        }
        Ok(())
    }
}

#[async_trait]
impl BankStore for InMemoryBankStore {
    async fn begin(&self) -> StoreResult<TransactionBox> {
        Ok(Box::new(UnitOfWork::new(self.inner.clone())))
    }

    async fn create_account(&self, account: NewAccount) -> StoreResult<Account> {
        let account = Account::open(self.inner.sequences.next(Sequence::Account), account);
        let mut tables = self.inner.tables.write().await;
        tables.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn get_account(&self, id: AccountId) -> StoreResult<Option<Account>> {
        self.inner.load_account(id).await
    }

    async fn accounts_by_owner(&self, owner: &str) -> StoreResult<Vec<Account>> {
        let tables = self.inner.tables.read().await;
        Ok(tables
            .accounts
            .values()
            .filter(|account| account.owner == owner)
            .cloned()
            .collect())
    }

    async fn all_accounts(&self) -> StoreResult<Vec<Account>> {
        let tables = self.inner.tables.read().await;
        Ok(tables.accounts.values().cloned().collect())
    }

    async fn set_account_active(&self, id: AccountId, active: bool) -> StoreResult<()> {
        let _row = self.inner.locks.acquire(id).await;
        let mut tables = self.inner.tables.write().await;
        let account = tables
            .accounts
            .get_mut(&id)
            .ok_or(StoreError::MissingAccount(id))?;
        account.active = active;
        Ok(())
    }

    async fn create_card(&self, card: NewCard) -> StoreResult<StoredCard> {
        let mut tables = self.inner.tables.write().await;
        if !tables.accounts.contains_key(&card.account_id) {
            return Err(StoreError::MissingAccount(card.account_id));
        }
        let card = StoredCard::from_new(self.inner.sequences.next(Sequence::Card), card);
        tables.cards.insert(card.id, card.clone());
        Ok(card)
    }

    async fn cards_by_account(&self, account_id: AccountId) -> StoreResult<Vec<StoredCard>> {
        let tables = self.inner.tables.read().await;
        Ok(tables
            .cards
            .values()
            .filter(|card| card.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn get_credit(&self, id: CreditId) -> StoreResult<Option<Credit>> {
        Ok(self.inner.tables.read().await.credits.get(&id).cloned())
    }

    async fn payment_schedule(&self, credit_id: CreditId) -> StoreResult<Vec<PaymentScheduleEntry>> {
        let tables = self.inner.tables.read().await;
        let mut schedule: Vec<PaymentScheduleEntry> = tables
            .payments
            .values()
            .filter(|entry| entry.credit_id == credit_id)
            .cloned()
            .collect();
        schedule.sort_by_key(|entry| entry.sequence);
        Ok(schedule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::credit::{NewCredit, NewPaymentEntry};
    use crate::domain::money::{Balance, Currency};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn new_account(owner: &str) -> NewAccount {
        NewAccount {
            owner: owner.to_string(),
            currency: Currency::parse("USD").unwrap(),
            created_at: Utc::now(),
        }
    }

    fn new_credit() -> NewCredit {
        NewCredit {
            borrower: "alice".to_string(),
            principal: dec!(1000),
            currency: Currency::parse("USD").unwrap(),
            monthly_rate: dec!(0.01),
            term_months: 2,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_in_memory_account_store() {
        let store = InMemoryBankStore::new();
        let first = store.create_account(new_account("alice")).await.unwrap();
        let second = store.create_account(new_account("bob")).await.unwrap();

        assert_eq!((first.id, second.id), (1, 2));
        assert_eq!(store.get_account(1).await.unwrap().unwrap(), first);
        assert!(store.get_account(3).await.unwrap().is_none());

        let owned = store.accounts_by_owner("alice").await.unwrap();
        assert_eq!(owned, vec![first]);
        assert_eq!(store.all_accounts().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_commit_applies_balance_deltas() {
        let store = InMemoryBankStore::new();
        let account = store.create_account(new_account("alice")).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.update_account_balance(account.id, dec!(40)).await.unwrap();
        tx.update_account_balance(account.id, dec!(2.5)).await.unwrap();
        let seen = tx.lock_account(account.id).await.unwrap().unwrap();
        assert_eq!(seen.balance, Balance::new(dec!(42.5)));
        tx.commit().await.unwrap();

        let stored = store.get_account(account.id).await.unwrap().unwrap();
        assert_eq!(stored.balance, Balance::new(dec!(42.5)));
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible() {
        let store = InMemoryBankStore::new();
        let account = store.create_account(new_account("alice")).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.update_account_balance(account.id, dec!(10)).await.unwrap();
        assert_eq!(
            store.get_account(account.id).await.unwrap().unwrap().balance,
            Balance::ZERO
        );
        tx.rollback().await.unwrap();

        assert_eq!(
            store.get_account(account.id).await.unwrap().unwrap().balance,
            Balance::ZERO
        );
    }

    #[tokio::test]
    async fn test_commit_refuses_negative_balance() {
        let store = InMemoryBankStore::new();
        let account = store.create_account(new_account("alice")).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.update_account_balance(account.id, dec!(-1)).await.unwrap();
        let result = tx.commit().await;

        assert!(matches!(result, Err(StoreError::NegativeBalance(id)) if id == account.id));
    }

    #[tokio::test]
    async fn test_commit_refuses_overflowing_balance() {
        let store = InMemoryBankStore::new();
        let account = store.create_account(new_account("alice")).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.update_account_balance(account.id, Decimal::MAX).await.unwrap();
        assert!(matches!(
            tx.update_account_balance(account.id, Decimal::MAX).await,
            Err(StoreError::BalanceOverflow(_))
        ));
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.update_account_balance(account.id, dec!(1)).await.unwrap();
        assert!(matches!(
            tx.commit().await,
            Err(StoreError::BalanceOverflow(id)) if id == account.id
        ));
        assert_eq!(
            store.get_account(account.id).await.unwrap().unwrap().balance,
            Balance::new(Decimal::MAX)
        );
        assert!(store.inner.locks.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_ids_leave_no_row_locks() {
        let store = InMemoryBankStore::new();
        for id in 1..=1000 {
            let mut tx = store.begin().await.unwrap();
            assert!(tx.lock_account(id).await.unwrap().is_none());
            tx.rollback().await.unwrap();
        }
        assert!(store.inner.locks.is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_account_fails() {
        let store = InMemoryBankStore::new();
        let mut tx = store.begin().await.unwrap();
        let result = tx.update_account_balance(99, dec!(1)).await;
        assert!(matches!(result, Err(StoreError::MissingAccount(99))));
    }

    #[tokio::test]
    async fn test_payments_require_a_credit() {
        let store = InMemoryBankStore::new();
        let mut tx = store.begin().await.unwrap();
        let orphan = NewPaymentEntry {
            credit_id: 5,
            sequence: 1,
            due_date: Utc::now(),
            amount: dec!(10),
        };
        assert!(matches!(
            tx.insert_payment(orphan).await,
            Err(StoreError::MissingCredit(5))
        ));
    }

    #[tokio::test]
    async fn test_credit_and_schedule_commit_together() {
        let store = InMemoryBankStore::new();
        let mut tx = store.begin().await.unwrap();
        let credit = tx.insert_credit(new_credit()).await.unwrap();
        for sequence in [2, 1] {
            tx.insert_payment(NewPaymentEntry {
                credit_id: credit.id,
                sequence,
                due_date: Utc::now(),
                amount: dec!(507.51),
            })
            .await
            .unwrap();
        }
        assert!(store.get_credit(credit.id).await.unwrap().is_none());
        tx.commit().await.unwrap();

        assert_eq!(store.get_credit(credit.id).await.unwrap(), Some(credit.clone()));
        let schedule = store.payment_schedule(credit.id).await.unwrap();
        let sequences: Vec<u32> = schedule.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_cards_are_scoped_to_account() {
        let store = InMemoryBankStore::new();
        let account = store.create_account(new_account("alice")).await.unwrap();
        let card = NewCard {
            account_id: account.id,
            encrypted_pan: vec![1, 2, 3],
            expiry: crate::domain::card::Expiry { month: 1, year: 2030 },
            cardholder_name: "ALICE".to_string(),
            created_at: Utc::now(),
        };

        let stored = store.create_card(card.clone()).await.unwrap();
        assert!(stored.active);
        assert_eq!(store.cards_by_account(account.id).await.unwrap(), vec![stored]);
        assert!(store.cards_by_account(42).await.unwrap().is_empty());

        let orphan = NewCard { account_id: 42, ..card };
        assert!(matches!(
            store.create_card(orphan).await,
            Err(StoreError::MissingAccount(42))
        ));
    }
}
