use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use token_indexer::config::Config;
use token_indexer::events::TokenStandard;
use token_indexer::export::ScannerDatabase;
use token_indexer::ledger::{ChainGateway, ContractProxy, TransactionPipeline, parse_address};
use token_indexer::repository::{Database, Token, TokenRepository};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "migrate")]
#[command(about = "Create the indexer and scanner schemas and seed tokens", long_about = None)]
struct Cli {
    /// JSON array of tokens to register
    #[arg(long)]
    seed: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedToken {
    address: String,
    name: Option<String>,
    symbol: Option<String>,
    #[serde(rename = "type")]
    token_type: String,
    #[serde(default = "zero_supply")]
    total_supply: String,
    #[serde(default)]
    synced_till_block: u64,
}

fn zero_supply() -> String {
    "0".to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    info!("Running migrations on database: {}", config.database_url);
    let db = Database::new(&config.database_url)?;
    info!("Running migrations on scanner database: {}", config.scanner_database_url);
    ScannerDatabase::new(&config.scanner_database_url)?;

    if let Some(path) = cli.seed {
        seed_tokens(&db, &config, &path).await?;
    }

    info!("Migrations completed successfully");
    Ok(())
}

async fn seed_tokens(db: &Database, config: &Config, path: &Path) -> Result<()> {
    let existing = db.with_conn(|conn| TokenRepository::new(conn).count())?;
    if existing > 0 {
        warn!("Skipping token seed, tokens table already holds {} rows", existing);
        return Ok(());
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file {}", path.display()))?;
    let seeds: Vec<SeedToken> = serde_json::from_str(&raw).context("Invalid seed file")?;

    // only needed when a seed entry leaves name or symbol out
    let client = ChainGateway::new(config.ledger.clone(), TransactionPipeline::new())?
        .rpc_client()
        .ok();

    let mut tokens = Vec::with_capacity(seeds.len());
    for seed in seeds {
        let address = parse_address(&seed.address)
            .with_context(|| format!("Invalid token address {}", seed.address))?;
        let standard: TokenStandard = seed.token_type.parse()?;

        let (name, symbol) = match (seed.name, seed.symbol) {
            (Some(name), Some(symbol)) => (name, symbol),
            (name, symbol) => {
                let client = client
                    .as_ref()
                    .context("Seed token without name or symbol needs an HTTP provider")?;
                let proxy = ContractProxy::from_config(standard, &config.ledger);
                let (chain_name, chain_symbol) = proxy
                    .instance_at(address, client.provider().clone())
                    .metadata()
                    .await
                    .with_context(|| format!("Failed to read metadata of {address:?}"))?;
                (name.unwrap_or(chain_name), symbol.unwrap_or(chain_symbol))
            }
        };

        tokens.push(Token {
            address,
            name,
            symbol,
            token_type: standard.as_str().to_string(),
            total_supply: seed.total_supply,
            total_holders: 0,
            synced_till_block: seed.synced_till_block,
        });
    }

    let inserted = db.with_transaction(|tx| {
        let repo = TokenRepository::new(tx);
        let mut inserted = 0;
        for token in &tokens {
            inserted += repo.insert(token)?;
        }
        Ok(inserted)
    })?;
    info!("Seeded {} tokens", inserted);

    Ok(())
}
