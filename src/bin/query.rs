use anyhow::Result;
use clap::{Parser, Subcommand};
use token_indexer::config::Config;
use token_indexer::query::commands::{
    DEFAULT_TAKE, HoldersQuery, cmd_holders, cmd_token_info, cmd_tokens,
};
use token_indexer::query::formatters::OutputFormat;
use token_indexer::repository::{BalanceRepository, Database, TokenRepository};

#[derive(Parser)]
#[command(name = "query")]
#[command(about = "Query indexed ERC20 and ERC721 token data", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// All registered tokens
    Tokens,
    /// One token with its transfer count
    Token { address: String },
    /// Holders ordered by balance
    Holders {
        address: String,

        #[arg(long, default_value = "0")]
        skip: u64,

        #[arg(long, default_value_t = DEFAULT_TAKE)]
        take: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = OutputFormat::from(cli.format.as_str());

    let config = Config::from_env()?;
    let db = Database::new(&config.database_url)?;

    let output = db.with_conn(|conn| {
        let token_repo = TokenRepository::new(conn);
        match cli.command {
            Commands::Tokens => cmd_tokens(&token_repo, &format),
            Commands::Token { address } => cmd_token_info(&token_repo, &address, &format),
            Commands::Holders {
                address,
                skip,
                take,
            } => cmd_holders(
                &token_repo,
                &BalanceRepository::new(conn),
                HoldersQuery {
                    address,
                    skip,
                    take,
                },
                &format,
            ),
        }
    })?;
    println!("{output}");

    Ok(())
}
