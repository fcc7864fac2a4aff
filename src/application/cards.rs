use super::finish;
use crate::config::{Clock, EngineConfig, SystemClock};
use crate::crypto::{CvvDeriver, OsRandom, PanVault, RandomSource, SealedBoxVault, generate_pan};
use crate::domain::account::AccountId;
use crate::domain::card::{Card, Cvv, Expiry, NewCard, Pan};
use crate::domain::ports::{BankStoreRef, StoreTransaction};
use crate::error::{BankError, Result, StoreResultExt};
use std::sync::Arc;
use tracing::debug;

/// Issues virtual cards and hands them back with a freshly derived CVV.
///
/// The PAN only reaches the store sealed by the [`PanVault`]; the CVV never
/// reaches it at all.
pub struct CardEngine {
    store: BankStoreRef,
    random: Arc<dyn RandomSource>,
    cvv: CvvDeriver,
    vault: Arc<dyn PanVault>,
    clock: Arc<dyn Clock>,
    scheme_digit: u8,
    validity_years: u32,
}

impl CardEngine {
    /// Builds the engine with the OS random source and a sealed-box vault
    /// keyed by `config.pan_key`.
    pub fn new(store: BankStoreRef, config: &EngineConfig) -> Result<Self> {
        Ok(Self {
            store,
            random: Arc::new(OsRandom),
            cvv: CvvDeriver::new(&config.cvv_key)?,
            vault: Arc::new(SealedBoxVault::new(&config.pan_key)),
            clock: Arc::new(SystemClock),
            scheme_digit: config.card_scheme_digit,
            validity_years: config.card_validity_years,
        })
    }

    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    pub fn with_vault(mut self, vault: Arc<dyn PanVault>) -> Self {
        self.vault = vault;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Issues a card against an active account.
    ///
    /// The account row stays locked until the card is stored, so a
    /// concurrent deactivation either lands before the check or after the
    /// card exists.
    pub async fn generate_virtual_card(
        &self,
        account_id: AccountId,
        cardholder_name: &str,
    ) -> Result<Card> {
        let cardholder_name = cardholder_name.trim();
        if cardholder_name.is_empty() {
            return Err(BankError::InvalidCardholderName);
        }
        let mut tx = self.store.begin().await.with_operation("generate card")?;
        let result = self.issue_in(tx.as_mut(), account_id, cardholder_name).await;
        let card = finish(tx, result, "generate card").await?;

        debug!(
            card = card.id,
            account = account_id,
            pan = %card.pan.masked(),
            expiry = %card.expiry,
            "card issued"
        );
        Ok(card)
    }

    async fn issue_in(
        &self,
        tx: &mut dyn StoreTransaction,
        account_id: AccountId,
        cardholder_name: &str,
    ) -> Result<Card> {
        let account = tx
            .lock_account(account_id)
            .await
            .with_operation("generate card")?
            .ok_or(BankError::AccountNotFound(account_id))?;
        account.ensure_active()?;

        let pan = generate_pan(self.random.as_ref(), self.scheme_digit)?;
        let issued_at = self.clock.now();
        let expiry = Expiry::from_issue(issued_at, self.validity_years).ok_or_else(|| {
            BankError::Generation(format!(
                "expiry {} years after {issued_at} is out of range",
                self.validity_years
            ))
        })?;
        let cvv = self.cvv.derive(&pan, expiry)?;
        let encrypted_pan = self.vault.seal(&pan)?;

        let stored = self
            .store
            .create_card(NewCard {
                account_id,
                encrypted_pan,
                expiry,
                cardholder_name: cardholder_name.to_string(),
                created_at: issued_at,
            })
            .await
            .with_operation("generate card")?;
        Ok(stored.reveal(pan, cvv))
    }

    /// Every card of the account with its PAN opened and its CVV recomputed.
    pub async fn cards_by_account(&self, account_id: AccountId) -> Result<Vec<Card>> {
        let stored = self
            .store
            .cards_by_account(account_id)
            .await
            .with_operation("list cards")?;

        stored
            .into_iter()
            .map(|card| -> Result<Card> {
                let pan = self.vault.open(&card.encrypted_pan)?;
                let cvv = self.cvv.derive(&pan, card.expiry)?;
                Ok(card.reveal(pan, cvv))
            })
            .collect()
    }

    /// The verification code a card with this PAN and expiry carries.
    pub fn cvv(&self, pan: &Pan, expiry: Expiry) -> Result<Cvv> {
        self.cvv.derive(pan, expiry)
    }
}
