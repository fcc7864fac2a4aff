use crate::domain::account::AccountId;
use crate::domain::credit::CreditId;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised by a storage gateway.
///
/// These describe what went wrong inside the backend. Engines wrap them into
/// [`BankError::Persistence`] together with the name of the operation that
/// was running.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("account {0} does not exist")]
    MissingAccount(AccountId),
    #[error("credit {0} does not exist")]
    MissingCredit(CreditId),
    #[error("balance of account {0} would become negative")]
    NegativeBalance(AccountId),
    #[error("balance of account {0} would overflow")]
    BalanceOverflow(AccountId),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Every failure the banking core can report to its callers.
#[derive(Error, Debug)]
pub enum BankError {
    // Validation errors: caller mistakes, never retried.
    #[error("amount must be positive, got {0}")]
    InvalidAmount(Decimal),
    #[error("invalid currency code '{0}'")]
    InvalidCurrency(String),
    #[error("cardholder name must not be blank")]
    InvalidCardholderName,
    #[error("cannot transfer from account {0} to itself")]
    SameAccount(AccountId),
    #[error("currency mismatch: account {from} holds {from_currency}, account {to} holds {to_currency}")]
    CurrencyMismatch {
        from: AccountId,
        from_currency: String,
        to: AccountId,
        to_currency: String,
    },
    #[error("principal must be positive, got {0}")]
    InvalidPrincipal(Decimal),
    #[error("principal {0} amortizes to a zero installment")]
    PrincipalTooSmall(Decimal),
    #[error("monthly rate must be positive, got {0}")]
    InvalidRate(Decimal),
    #[error("term must be between 1 and {max} months, got {term}")]
    InvalidTerm { term: i64, max: u32 },
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    // Integrity errors: business-rule rejections.
    #[error("account {0} not found")]
    AccountNotFound(AccountId),
    #[error("account {0} is inactive")]
    AccountInactive(AccountId),
    #[error("account {account} is not owned by {caller}")]
    NotAccountOwner { account: AccountId, caller: String },
    #[error("insufficient funds in account {account}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account: AccountId,
        balance: Decimal,
        requested: Decimal,
    },
    #[error("balance of account {0} would overflow")]
    BalanceOverflow(AccountId),
    #[error("credit {0} not found")]
    CreditNotFound(CreditId),
    #[error("annuity payment overflows for principal {principal}, rate {rate}, term {term}")]
    AmortizationOverflow {
        principal: Decimal,
        rate: Decimal,
        term: u32,
    },
    #[error("due dates of a {term}-month schedule fall outside the calendar")]
    DueDateOverflow { term: u32 },

    // Cryptographic errors: fatal to the operation.
    #[error("card generation failed: {0}")]
    Generation(String),
    #[error("encryption failed: {0}")]
    Encryption(String),
    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("{operation} failed: {source}")]
    Persistence {
        operation: &'static str,
        #[source]
        source: StoreError,
    },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, BankError>;

impl BankError {
    pub fn persistence(operation: &'static str, source: StoreError) -> Self {
        BankError::Persistence { operation, source }
    }
}

/// Attaches the running operation to a storage failure.
pub trait StoreResultExt<T> {
    fn with_operation(self, operation: &'static str) -> Result<T>;
}

impl<T> StoreResultExt<T> for StoreResult<T> {
    fn with_operation(self, operation: &'static str) -> Result<T> {
        self.map_err(|source| BankError::persistence(operation, source))
    }
}
