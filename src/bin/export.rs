use anyhow::Result;
use clap::Parser;
use token_indexer::config::Config;
use token_indexer::events::TokenStandard;
use token_indexer::export::{DEFAULT_BATCH_SIZE, ScannerDatabase, ScannerExporter};
use token_indexer::repository::Database;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "export")]
#[command(about = "Replay indexed transfers into the scanner database", long_about = None)]
struct Cli {
    /// erc20 or erc721
    #[arg(long)]
    standard: TokenStandard,

    /// Ledger position to resume from, as reported by the previous run
    #[arg(long, default_value = "0")]
    offset: u64,

    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if cli.standard == TokenStandard::Erc1155 {
        anyhow::bail!("ERC1155 transfers are not indexed");
    }

    let config = Config::from_env()?;
    let ledger = Database::new(&config.database_url)?;
    let mut scanner = ScannerDatabase::new(&config.scanner_database_url)?;

    let result = ScannerExporter::new(&ledger, &mut scanner, cli.standard)
        .with_batch_size(cli.batch_size)
        .run(cli.offset);

    match result {
        Ok(report) => {
            info!(
                "Export finished: {} transfers, resume with --offset {}",
                report.exported, report.next_offset
            );
            Ok(())
        }
        Err(e) => {
            error!("Export aborted: {:#}", e);
            Err(e)
        }
    }
}
