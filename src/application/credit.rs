use super::finish;
use crate::config::{Clock, SystemClock};
use crate::domain::credit::{
    Credit, CreditId, IssuedCredit, NewCredit, NewPaymentEntry, PaymentScheduleEntry,
    annuity_payment, due_dates,
};
use crate::domain::money::Currency;
use crate::domain::ports::{BankStoreRef, StoreTransaction};
use crate::error::{BankError, Result, StoreResultExt};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

/// Issues annuity credits and their repayment schedules.
pub struct CreditEngine {
    store: BankStoreRef,
    clock: Arc<dyn Clock>,
    max_term: u32,
}

impl CreditEngine {
    pub fn new(store: BankStoreRef, max_term: u32) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            max_term,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validates the terms, computes the fixed monthly payment and stores the
    /// credit with all `term` schedule entries in one transaction.
    ///
    /// Entry `i` is due `i` calendar months after issuance. Either the credit
    /// and its whole schedule become visible or nothing does.
    pub async fn issue_credit(
        &self,
        borrower: &str,
        principal: Decimal,
        currency: &str,
        monthly_rate: Decimal,
        term: i64,
    ) -> Result<IssuedCredit> {
        if principal <= Decimal::ZERO {
            return Err(BankError::InvalidPrincipal(principal));
        }
        if monthly_rate <= Decimal::ZERO {
            return Err(BankError::InvalidRate(monthly_rate));
        }
        let term_months = u32::try_from(term)
            .ok()
            .filter(|months| (1..=self.max_term).contains(months))
            .ok_or(BankError::InvalidTerm {
                term,
                max: self.max_term,
            })?;
        let currency = Currency::parse(currency)?;

        let payment = annuity_payment(principal, monthly_rate, term_months)?;
        let issued_at = self.clock.now();
        let due = due_dates(issued_at, term_months)?;

        let new_credit = NewCredit {
            borrower: borrower.to_string(),
            principal,
            currency,
            monthly_rate,
            term_months,
            created_at: issued_at,
        };

        let mut tx = self.store.begin().await.with_operation("issue credit")?;
        let result = Self::insert_schedule(tx.as_mut(), new_credit, payment, due).await;
        let issued = finish(tx, result, "issue credit").await?;

        info!(
            credit = issued.credit.id,
            borrower,
            principal = %principal,
            payment = %payment,
            term = term_months,
            "credit issued"
        );
        Ok(issued)
    }

    async fn insert_schedule(
        tx: &mut dyn StoreTransaction,
        credit: NewCredit,
        payment: Decimal,
        due: Vec<DateTime<Utc>>,
    ) -> Result<IssuedCredit> {
        let credit = tx
            .insert_credit(credit)
            .await
            .with_operation("issue credit")?;

        let mut schedule = Vec::with_capacity(due.len());
        for (sequence, due_date) in (1..).zip(due) {
            let entry = tx
                .insert_payment(NewPaymentEntry {
                    credit_id: credit.id,
                    sequence,
                    due_date,
                    amount: payment,
                })
                .await
                .with_operation("issue credit")?;
            schedule.push(entry);
        }

        Ok(IssuedCredit { credit, schedule })
    }

    pub async fn get_credit(&self, id: CreditId) -> Result<Credit> {
        self.store
            .get_credit(id)
            .await
            .with_operation("get credit")?
            .ok_or(BankError::CreditNotFound(id))
    }

    /// Schedule of an existing credit, ordered by sequence number.
    pub async fn payment_schedule(&self, id: CreditId) -> Result<Vec<PaymentScheduleEntry>> {
        self.get_credit(id).await?;
        self.store
            .payment_schedule(id)
            .await
            .with_operation("payment schedule")
    }
}
