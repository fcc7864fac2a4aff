//! Runs a CSV command script against the engines.

use super::csv::account_writer::AccountWriter;
use super::csv::command_reader::{CommandReader, CommandRecord, CommandType};
use crate::application::BankServices;
use crate::error::Result;
use std::io::{Read, Write};
use tracing::{debug, warn};

/// Counts of the rows a script run applied and rejected.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScriptSummary {
    pub applied: usize,
    pub rejected: usize,
}

/// Applies one command.
pub async fn apply_command(services: &BankServices, command: &CommandRecord) -> Result<()> {
    match command.op {
        CommandType::Open => {
            let owner = command.required("owner", &command.owner)?;
            let currency = command.required("currency", &command.currency)?;
            let account = services.ledger.create_account(&owner, &currency).await?;
            debug!(account = account.id, "script opened account");
        }
        CommandType::Deposit => {
            let account = command.required("account", &command.account)?;
            let amount = command.required("amount", &command.amount)?;
            services.ledger.deposit(account, amount).await?;
        }
        CommandType::Withdraw => {
            let account = command.required("account", &command.account)?;
            let amount = command.required("amount", &command.amount)?;
            services.ledger.withdraw(account, amount).await?;
        }
        CommandType::Transfer => {
            let from = command.required("account", &command.account)?;
            let to = command.required("target", &command.target)?;
            let amount = command.required("amount", &command.amount)?;
            services.ledger.transfer(from, to, amount).await?;
        }
        CommandType::Deactivate => {
            let account = command.required("account", &command.account)?;
            services.ledger.deactivate_account(account).await?;
        }
        CommandType::Credit => {
            let borrower = command.required("owner", &command.owner)?;
            let principal = command.required("amount", &command.amount)?;
            let currency = command.required("currency", &command.currency)?;
            let rate = command.required("rate", &command.rate)?;
            let term = command.required("term", &command.term)?;
            services
                .credit
                .issue_credit(&borrower, principal, &currency, rate, term)
                .await?;
        }
        CommandType::Card => {
            let account = command.required("account", &command.account)?;
            let holder = command.required("owner", &command.owner)?;
            let card = services.cards.generate_virtual_card(account, &holder).await?;
            debug!(card = card.id, pan = %card.pan.masked(), "script issued card");
        }
    }
    Ok(())
}

/// Applies every row of `input`, then writes the account report to `output`.
///
/// Unreadable or rejected rows are logged and skipped; only a failure to
/// produce the report aborts the run.
pub async fn run_script<R: Read, W: Write>(
    services: &BankServices,
    input: R,
    output: W,
) -> Result<ScriptSummary> {
    let mut summary = ScriptSummary::default();

    for (index, row) in CommandReader::new(input).commands().enumerate() {
        let line = index + 2;
        let outcome = match row {
            Ok(command) => apply_command(services, &command).await,
            Err(err) => Err(err),
        };
        match outcome {
            Ok(()) => summary.applied += 1,
            Err(err) => {
                warn!(line, error = %err, "command rejected");
                summary.rejected += 1;
            }
        }
    }

    let accounts = services.ledger.all_accounts().await?;
    AccountWriter::new(output).write_accounts(accounts)?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, KeyMaterial};
    use crate::infrastructure::in_memory::InMemoryBankStore;
    use std::sync::Arc;

    fn services() -> BankServices {
        let config = EngineConfig::new(KeyMaterial::new([1; 32]), KeyMaterial::new([2; 32]));
        BankServices::new(Arc::new(InMemoryBankStore::new()), &config).unwrap()
    }

    #[tokio::test]
    async fn test_script_applies_and_reports() {
        let script = "\
op, owner, account, target, amount, currency, rate, term
open, alice, , , , USD, ,
open, bob, , , , USD, ,
deposit, , 1, , 100, , ,
transfer, , 1, 2, 30, , ,
withdraw, , 2, , 50, , ,
card, Alice Doe, 1, , , , ,
credit, bob, , , 1000, USD, 0.01, 12
deposit, , 9, , 1, , ,
";
        let services = services();
        let mut out = Vec::new();
        let summary = run_script(&services, script.as_bytes(), &mut out).await.unwrap();

        assert_eq!(summary, ScriptSummary { applied: 6, rejected: 2 });
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "id,owner,currency,balance,active\n1,alice,USD,70,true\n2,bob,USD,30,true\n"
        );
        assert_eq!(services.cards.cards_by_account(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_column_is_rejected() {
        let script = "op, owner, account, target, amount, currency, rate, term\nopen, alice, , , , , ,\n";
        let mut out = Vec::new();
        let summary = run_script(&services(), script.as_bytes(), &mut out).await.unwrap();

        assert_eq!(summary, ScriptSummary { applied: 0, rejected: 1 });
        assert_eq!(String::from_utf8(out).unwrap(), "id,owner,currency,balance,active\n");
    }
}
