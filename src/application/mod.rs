//! Application layer: the ledger, credit and card engines.
//!
//! The engines hold no locks of their own. Anything that has to be atomic
//! runs inside one [`StoreTransaction`] and is closed through [`finish`].

pub mod cards;
pub mod credit;
pub mod ledger;

use crate::config::{Clock, EngineConfig};
use crate::domain::ports::{BankStoreRef, StoreTransaction};
use crate::error::{Result, StoreResultExt};
use std::sync::Arc;
use tracing::warn;

pub use cards::CardEngine;
pub use credit::CreditEngine;
pub use ledger::LedgerEngine;

/// Commits `tx` when `result` is `Ok`, rolls it back otherwise.
///
/// A rollback failure is logged and the original error is returned.
pub(crate) async fn finish<T>(
    tx: Box<dyn StoreTransaction>,
    result: Result<T>,
    operation: &'static str,
) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await.with_operation(operation)?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                warn!(operation, error = %rollback, "rollback failed");
            }
            Err(err)
        }
    }
}

/// The three engines wired to one store and one configuration.
pub struct BankServices {
    pub ledger: LedgerEngine,
    pub credit: CreditEngine,
    pub cards: CardEngine,
}

impl BankServices {
    pub fn new(store: BankStoreRef, config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            ledger: LedgerEngine::new(store.clone()),
            credit: CreditEngine::new(store.clone(), config.max_credit_term_months),
            cards: CardEngine::new(store, config)?,
        })
    }

    /// Replaces the clock of every engine.
    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger: self.ledger.with_clock(clock.clone()),
            credit: self.credit.with_clock(clock.clone()),
            cards: self.cards.with_clock(clock),
        }
    }
}
