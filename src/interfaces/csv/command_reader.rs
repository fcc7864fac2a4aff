use crate::domain::account::AccountId;
use crate::error::{BankError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fmt;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    Open,
    Deposit,
    Withdraw,
    Transfer,
    Deactivate,
    Credit,
    Card,
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandType::Open => "open",
            CommandType::Deposit => "deposit",
            CommandType::Withdraw => "withdraw",
            CommandType::Transfer => "transfer",
            CommandType::Deactivate => "deactivate",
            CommandType::Credit => "credit",
            CommandType::Card => "card",
        };
        f.write_str(name)
    }
}

/// One row of a command script. Which columns are required depends on `op`.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct CommandRecord {
    pub op: CommandType,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub account: Option<AccountId>,
    #[serde(default)]
    pub target: Option<AccountId>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub rate: Option<Decimal>,
    #[serde(default)]
    pub term: Option<i64>,
}

impl CommandRecord {
    /// Returns a column the command cannot run without.
    pub fn required<T: Clone>(&self, field: &'static str, value: &Option<T>) -> Result<T> {
        value.clone().ok_or_else(|| {
            BankError::InvalidCommand(format!("'{}' requires the '{field}' column", self.op))
        })
    }
}

/// Reads commands from a CSV source.
///
/// Fields are trimmed and short rows are accepted; missing trailing columns
/// read as empty.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes the rows, one `Result` per row.
    pub fn commands(self) -> impl Iterator<Item = Result<CommandRecord>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(BankError::from))
    }
}
