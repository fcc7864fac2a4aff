use super::money::Currency;
use crate::error::BankError;
use chrono::{DateTime, Months, Utc};
use rust_decimal::{Decimal, MathematicalOps, RoundingStrategy};
use serde::{Deserialize, Serialize};

pub type CreditId = i64;
pub type PaymentId = i64;

/// Scale the schedule amounts are rounded to.
pub const PAYMENT_SCALE: u32 = 2;

/// Lifecycle state of a credit. Only `Open` is produced at issuance; the
/// other transitions belong to the collection process.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum CreditStatus {
    #[default]
    Open,
    Closed,
    Overdue,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Credit {
    pub id: CreditId,
    pub borrower: String,
    pub principal: Decimal,
    pub currency: Currency,
    /// Fractional monthly rate, e.g. `0.02` for 2%.
    pub monthly_rate: Decimal,
    pub term_months: u32,
    pub status: CreditStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCredit {
    pub borrower: String,
    pub principal: Decimal,
    pub currency: Currency,
    pub monthly_rate: Decimal,
    pub term_months: u32,
    pub created_at: DateTime<Utc>,
}

impl Credit {
    pub fn from_new(id: CreditId, new: NewCredit) -> Self {
        Self {
            id,
            borrower: new.borrower,
            principal: new.principal,
            currency: new.currency,
            monthly_rate: new.monthly_rate,
            term_months: new.term_months,
            status: CreditStatus::Open,
            created_at: new.created_at,
        }
    }
}

/// One installment of a credit's repayment schedule.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PaymentScheduleEntry {
    pub id: PaymentId,
    pub credit_id: CreditId,
    /// 1-based position in the schedule.
    pub sequence: u32,
    pub due_date: DateTime<Utc>,
    pub amount: Decimal,
    pub paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPaymentEntry {
    pub credit_id: CreditId,
    pub sequence: u32,
    pub due_date: DateTime<Utc>,
    pub amount: Decimal,
}

impl PaymentScheduleEntry {
    pub fn from_new(id: PaymentId, new: NewPaymentEntry) -> Self {
        Self {
            id,
            credit_id: new.credit_id,
            sequence: new.sequence,
            due_date: new.due_date,
            amount: new.amount,
            paid: false,
            paid_at: None,
        }
    }
}

/// A freshly issued credit together with its repayment schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedCredit {
    pub credit: Credit,
    pub schedule: Vec<PaymentScheduleEntry>,
}

impl IssuedCredit {
    pub fn total_repayment(&self) -> Decimal {
        self.schedule.iter().map(|entry| entry.amount).sum()
    }

    pub fn total_interest(&self) -> Decimal {
        self.total_repayment() - self.credit.principal
    }
}

/// Equal-installment payment that amortizes `principal` over `term` months:
///
/// `principal * r * (1 + r)^n / ((1 + r)^n - 1)`
///
/// The result is rounded to [`PAYMENT_SCALE`] places, midpoint away from zero.
/// A principal too small to survive that rounding is rejected rather than
/// producing a schedule of zero installments. Inputs are expected to be
/// validated already; a zero rate or term would divide by zero and is
/// reported as an overflow.
pub fn annuity_payment(principal: Decimal, rate: Decimal, term: u32) -> Result<Decimal, BankError> {
    let overflow = || BankError::AmortizationOverflow {
        principal,
        rate,
        term,
    };

    let growth = (Decimal::ONE + rate)
        .checked_powu(u64::from(term))
        .ok_or_else(overflow)?;
    let numerator = principal
        .checked_mul(rate)
        .and_then(|value| value.checked_mul(growth))
        .ok_or_else(overflow)?;
    let payment = numerator
        .checked_div(growth - Decimal::ONE)
        .ok_or_else(overflow)?;

    let payment =
        payment.round_dp_with_strategy(PAYMENT_SCALE, RoundingStrategy::MidpointAwayFromZero);
    if payment.is_zero() {
        return Err(BankError::PrincipalTooSmall(principal));
    }
    Ok(payment)
}

/// Due dates `issued_at + i months` for `i = 1..=term`.
///
/// Each date is computed from the issue date rather than from the previous
/// installment so that month-end clamping does not drift (Jan 31 gives the
/// last day of February, then Mar 31, Apr 30, ...).
pub fn due_dates(issued_at: DateTime<Utc>, term: u32) -> Result<Vec<DateTime<Utc>>, BankError> {
    (1..=term)
        .map(|month| {
            issued_at
                .checked_add_months(Months::new(month))
                .ok_or(BankError::DueDateOverflow { term })
        })
        .collect()
}
