use super::finish;
use crate::config::{Clock, SystemClock};
use crate::domain::account::{Account, AccountId, NewAccount};
use crate::domain::money::{Amount, Currency};
use crate::domain::ports::{BankStoreRef, StoreTransaction};
use crate::error::{BankError, Result, StoreResultExt};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

/// Owns every balance mutation.
///
/// Each mutating call runs inside exactly one store transaction. Balance
/// checks read the account through [`StoreTransaction::lock_account`], so the
/// check and the write happen under the same row lock.
pub struct LedgerEngine {
    store: BankStoreRef,
    clock: Arc<dyn Clock>,
}

impl LedgerEngine {
    pub fn new(store: BankStoreRef) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn create_account(&self, owner: &str, currency: &str) -> Result<Account> {
        let currency = Currency::parse(currency)?;
        let account = self
            .store
            .create_account(NewAccount {
                owner: owner.to_string(),
                currency,
                created_at: self.clock.now(),
            })
            .await
            .with_operation("create account")?;
        debug!(account = account.id, owner, currency = %account.currency, "opened account");
        Ok(account)
    }

    pub async fn deposit(&self, account_id: AccountId, amount: Decimal) -> Result<()> {
        let amount = Amount::new(amount)?;
        let mut tx = self.store.begin().await.with_operation("deposit")?;
        let result = Self::deposit_in(tx.as_mut(), account_id, amount).await;
        finish(tx, result, "deposit").await?;
        debug!(account = account_id, amount = %amount.value(), "deposit committed");
        Ok(())
    }

    async fn deposit_in(tx: &mut dyn StoreTransaction, id: AccountId, amount: Amount) -> Result<()> {
        let account = lock_existing(tx, id, "deposit").await?;
        account.ensure_active()?;
        account.ensure_can_credit(amount)?;
        tx.update_account_balance(id, amount.value())
            .await
            .with_operation("deposit")
    }

    pub async fn withdraw(&self, account_id: AccountId, amount: Decimal) -> Result<()> {
        let amount = Amount::new(amount)?;
        let mut tx = self.store.begin().await.with_operation("withdraw")?;
        let result = Self::withdraw_in(tx.as_mut(), account_id, amount).await;
        finish(tx, result, "withdraw").await?;
        debug!(account = account_id, amount = %amount.value(), "withdrawal committed");
        Ok(())
    }

    async fn withdraw_in(tx: &mut dyn StoreTransaction, id: AccountId, amount: Amount) -> Result<()> {
        let account = lock_existing(tx, id, "withdraw").await?;
        account.ensure_active()?;
        account.ensure_can_debit(amount)?;
        tx.update_account_balance(id, -amount)
            .await
            .with_operation("withdraw")
    }

    /// Moves `amount` from one account to another atomically.
    ///
    /// Rows are locked in ascending id order whatever the direction of the
    /// transfer, so two opposite transfers between the same accounts cannot
    /// deadlock.
    pub async fn transfer(&self, from: AccountId, to: AccountId, amount: Decimal) -> Result<()> {
        if from == to {
            return Err(BankError::SameAccount(from));
        }
        let amount = Amount::new(amount)?;
        let mut tx = self.store.begin().await.with_operation("transfer")?;
        let result = Self::transfer_in(tx.as_mut(), from, to, amount).await;
        finish(tx, result, "transfer").await?;
        debug!(from, to, amount = %amount.value(), "transfer committed");
        Ok(())
    }

    async fn transfer_in(
        tx: &mut dyn StoreTransaction,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<()> {
        let (low, high) = if from < to { (from, to) } else { (to, from) };
        let low = lock_existing(tx, low, "transfer").await?;
        let high = lock_existing(tx, high, "transfer").await?;
        let (source, target) = if from < to { (low, high) } else { (high, low) };

        source.ensure_active()?;
        target.ensure_active()?;
        if source.currency != target.currency {
            return Err(BankError::CurrencyMismatch {
                from,
                from_currency: source.currency.to_string(),
                to,
                to_currency: target.currency.to_string(),
            });
        }
        source.ensure_can_debit(amount)?;
        target.ensure_can_credit(amount)?;

        tx.update_account_balance(from, -amount)
            .await
            .with_operation("transfer")?;
        tx.update_account_balance(to, amount.value())
            .await
            .with_operation("transfer")
    }

    pub async fn get_account(&self, id: AccountId) -> Result<Account> {
        self.store
            .get_account(id)
            .await
            .with_operation("get account")?
            .ok_or(BankError::AccountNotFound(id))
    }

    pub async fn accounts_by_owner(&self, owner: &str) -> Result<Vec<Account>> {
        self.store
            .accounts_by_owner(owner)
            .await
            .with_operation("list accounts")
    }

    pub async fn all_accounts(&self) -> Result<Vec<Account>> {
        self.store.all_accounts().await.with_operation("list accounts")
    }

    /// Returns the account if `caller` owns it.
    ///
    /// `caller` comes from the authentication layer and is trusted as-is.
    pub async fn owned_account(&self, caller: &str, id: AccountId) -> Result<Account> {
        let account = self.get_account(id).await?;
        if account.owner == caller {
            Ok(account)
        } else {
            Err(BankError::NotAccountOwner {
                account: id,
                caller: caller.to_string(),
            })
        }
    }

    /// Soft-deactivates an account. Its balance and history stay in place.
    pub async fn deactivate_account(&self, id: AccountId) -> Result<()> {
        self.get_account(id).await?;
        self.store
            .set_account_active(id, false)
            .await
            .with_operation("deactivate account")?;
        debug!(account = id, "account deactivated");
        Ok(())
    }
}

async fn lock_existing(
    tx: &mut dyn StoreTransaction,
    id: AccountId,
    operation: &'static str,
) -> Result<Account> {
    tx.lock_account(id)
        .await
        .with_operation(operation)?
        .ok_or(BankError::AccountNotFound(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Balance;
    use crate::infrastructure::in_memory::InMemoryBankStore;
    use rust_decimal_macros::dec;

    fn engine() -> LedgerEngine {
        LedgerEngine::new(Arc::new(InMemoryBankStore::new()))
    }

    #[tokio::test]
    async fn test_create_account_validates_currency() {
        let ledger = engine();
        let account = ledger.create_account("alice", "usd").await.unwrap();
        assert_eq!(account.currency.code(), "USD");
        assert_eq!(account.balance, Balance::ZERO);

        assert!(matches!(
            ledger.create_account("alice", "dollars").await,
            Err(BankError::InvalidCurrency(_))
        ));
    }

    #[tokio::test]
    async fn test_deposit_then_withdraw() {
        let ledger = engine();
        let account = ledger.create_account("alice", "USD").await.unwrap();

        ledger.deposit(account.id, dec!(100)).await.unwrap();
        ledger.withdraw(account.id, dec!(30.5)).await.unwrap();

        let account = ledger.get_account(account.id).await.unwrap();
        assert_eq!(account.balance, Balance::new(dec!(69.5)));
    }

    #[tokio::test]
    async fn test_rejects_non_positive_amounts() {
        let ledger = engine();
        let account = ledger.create_account("alice", "USD").await.unwrap();

        assert!(matches!(
            ledger.deposit(account.id, dec!(0)).await,
            Err(BankError::InvalidAmount(_))
        ));
        assert!(matches!(
            ledger.withdraw(account.id, dec!(-5)).await,
            Err(BankError::InvalidAmount(_))
        ));
    }

    #[tokio::test]
    async fn test_transfer_to_same_account() {
        let ledger = engine();
        let account = ledger.create_account("alice", "USD").await.unwrap();
        assert!(matches!(
            ledger.transfer(account.id, account.id, dec!(1)).await,
            Err(BankError::SameAccount(_))
        ));
    }

    #[tokio::test]
    async fn test_owned_account() {
        let ledger = engine();
        let account = ledger.create_account("alice", "USD").await.unwrap();

        assert_eq!(ledger.owned_account("alice", account.id).await.unwrap(), account);
        assert!(matches!(
            ledger.owned_account("mallory", account.id).await,
            Err(BankError::NotAccountOwner { .. })
        ));
    }

    #[tokio::test]
    async fn test_deactivated_account_rejects_deposits() {
        let ledger = engine();
        let account = ledger.create_account("alice", "USD").await.unwrap();
        ledger.deactivate_account(account.id).await.unwrap();

        assert!(matches!(
            ledger.deposit(account.id, dec!(1)).await,
            Err(BankError::AccountInactive(_))
        ));
        assert!(!ledger.get_account(account.id).await.unwrap().active);
    }
}
