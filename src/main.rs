use bankcore::application::BankServices;
use bankcore::config::EngineConfig;
use bankcore::domain::ports::BankStoreRef;
use bankcore::infrastructure::in_memory::InMemoryBankStore;
use bankcore::interfaces::script::run_script;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{self, BufReader, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input command script (CSV)
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Hex-encoded 32-byte key used to derive CVVs
    #[arg(long, env = "BANK_CVV_KEY", hide_env_values = true)]
    cvv_key: String,

    /// Hex-encoded 32-byte secret key that seals PANs at rest
    #[arg(long, env = "BANK_PAN_KEY", hide_env_values = true)]
    pan_key: String,

    /// Log per-operation detail to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(io::stderr().is_terminal())
                .without_time(),
        )
        .init();
}

#[cfg(feature = "storage-rocksdb")]
fn open_store(db_path: Option<PathBuf>) -> Result<BankStoreRef> {
    use bankcore::infrastructure::rocksdb::RocksDBStore;

    match db_path {
        Some(path) => {
            info!(path = %path.display(), "opening RocksDB store");
            let store = RocksDBStore::open(path).into_diagnostic()?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(InMemoryBankStore::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_store(db_path: Option<PathBuf>) -> Result<BankStoreRef> {
    if db_path.is_some() {
        tracing::warn!(
            "persistent storage requested via --db-path, but the 'storage-rocksdb' feature is not enabled; falling back to in-memory storage"
        );
    }
    Ok(Arc::new(InMemoryBankStore::new()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = EngineConfig::from_hex_keys(&cli.cvv_key, &cli.pan_key).into_diagnostic()?;
    let store = open_store(cli.db_path)?;
    let services = BankServices::new(store, &config).into_diagnostic()?;

    let input = BufReader::new(File::open(&cli.input).into_diagnostic()?);
    let stdout = io::stdout();
    let summary = run_script(&services, input, stdout.lock())
        .await
        .into_diagnostic()?;

    info!(
        applied = summary.applied,
        rejected = summary.rejected,
        "script finished"
    );
    Ok(())
}
