use anyhow::Result;
use token_indexer::config::{Config, ProviderKind};
use token_indexer::events::TokenStandard;
use token_indexer::ledger::{ChainGateway, ContractProxy, TransactionPipeline};
use token_indexer::repository::Database;
use token_indexer::sync::{SyncScheduler, TokenSyncEngine};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting token indexer");

    let config = Config::from_env()?;
    info!("Configuration loaded for network {}", config.ledger.network);

    let db = Database::new(&config.database_url)?;
    info!("Database initialized");

    let gateway = ChainGateway::new(config.ledger.clone(), TransactionPipeline::new())?;
    let client = gateway.rpc_client()?;
    info!("RPC client ready on {}", client.get_current_url());

    match gateway.signer(false) {
        Ok(signer) => info!("Signing as {:?}", signer.address()),
        Err(e) => warn!("No signer available: {}", e),
    }

    start_subscriptions(&gateway, &config);

    let engine = TokenSyncEngine::new(db, client, config.retry.clone())
        .with_window(config.sync.window_blocks);
    SyncScheduler::new(engine, &config.sync).run().await;

    Ok(())
}

fn start_subscriptions(gateway: &ChainGateway, config: &Config) {
    let ws_url = match gateway.provider_urls(ProviderKind::Ws) {
        Ok(urls) => urls[0].clone(),
        Err(e) => {
            warn!("Live subscriptions disabled: {}", e);
            return;
        }
    };

    for standard in [TokenStandard::Erc20, TokenStandard::Erc721] {
        let proxy = ContractProxy::from_config(standard, gateway.config());
        let Some(subscription) = proxy.subscribe(&ws_url, config.sync.subscription_reconnect)
        else {
            continue;
        };

        tokio::spawn(subscription.run(move |transfer| {
            info!(
                "Live {} transfer {:?} -> {:?} in block {}",
                standard, transfer.from, transfer.to, transfer.block_number
            );
        }));
    }
}
