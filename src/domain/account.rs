use super::money::{Amount, Balance, Currency};
use crate::error::BankError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type AccountId = i64;

/// A customer account as recorded by the ledger.
///
/// Balances only change through deposits, withdrawals and transfers, and the
/// currency is fixed when the account is opened. Accounts are never deleted;
/// closing one clears the `active` flag.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Account {
    pub id: AccountId,
    /// Identity of the user that owns the account.
    pub owner: String,
    pub currency: Currency,
    pub balance: Balance,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// The fields a caller supplies when opening an account.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAccount {
    pub owner: String,
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn open(id: AccountId, new: NewAccount) -> Self {
        Self {
            id,
            owner: new.owner,
            currency: new.currency,
            balance: Balance::ZERO,
            active: true,
            created_at: new.created_at,
        }
    }

    /// Rejects operations against a deactivated account.
    pub fn ensure_active(&self) -> Result<(), BankError> {
        if self.active {
            Ok(())
        } else {
            Err(BankError::AccountInactive(self.id))
        }
    }

    /// Checks that the current balance can fund `amount`.
    pub fn ensure_can_debit(&self, amount: Amount) -> Result<(), BankError> {
        if self.balance.covers(amount) {
            Ok(())
        } else {
            Err(BankError::InsufficientFunds {
                account: self.id,
                balance: self.balance.value(),
                requested: amount.value(),
            })
        }
    }

    /// Checks that crediting `amount` keeps the balance representable.
    pub fn ensure_can_credit(&self, amount: Amount) -> Result<(), BankError> {
        match self.balance.checked_add(amount.value()) {
            Some(_) => Ok(()),
            None => Err(BankError::BalanceOverflow(self.id)),
        }
    }
}
