use crate::domain::account::Account;
use crate::error::Result;
use std::io::Write;

/// Writes the account report: `id,owner,currency,balance,active`.
pub struct AccountWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> AccountWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Writes the header and one row per account, sorted by id.
    pub fn write_accounts(&mut self, mut accounts: Vec<Account>) -> Result<()> {
        accounts.sort_by_key(|account| account.id);
        self.writer
            .write_record(["id", "owner", "currency", "balance", "active"])?;
        for account in accounts {
            self.writer.write_record([
                account.id.to_string(),
                account.owner,
                account.currency.to_string(),
                account.balance.value().normalize().to_string(),
                account.active.to_string(),
            ])?;
        }
        self.writer.flush().map_err(csv::Error::from)?;
        Ok(())
    }
}
