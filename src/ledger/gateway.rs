use crate::config::{LedgerConfig, Network, ProviderKind};
use crate::error::IndexerError;
use crate::ledger::pipeline::TransactionPipeline;
use crate::rpc::RpcClient;
use alloy::providers::{DynProvider, Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::{Block, TransactionReceipt};
use alloy::signers::local::PrivateKeySigner;
use anyhow::Result;
use std::future::Future;
use tracing::info;

/// Entry point to the configured chain: endpoints, signing identity, block
/// reads and the outbound transaction pipeline.
pub struct ChainGateway {
    config: LedgerConfig,
    rpc: Option<RpcClient>,
    pipeline: TransactionPipeline<TransactionReceipt>,
}

impl ChainGateway {
    pub fn new(
        config: LedgerConfig,
        pipeline: TransactionPipeline<TransactionReceipt>,
    ) -> Result<Self> {
        let http = config
            .providers
            .get(&config.network)
            .map(|endpoints| endpoints.http.clone())
            .unwrap_or_default();

        // a missing HTTP endpoint only fails the calls that need it
        let rpc = if http.is_empty() {
            None
        } else {
            Some(RpcClient::new(&http)?)
        };

        Ok(Self {
            config,
            rpc,
            pipeline,
        })
    }

    pub fn network(&self) -> Network {
        self.config.network
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn provider_urls(&self, kind: ProviderKind) -> Result<Vec<String>, IndexerError> {
        let network = self.network();
        let endpoints = self.config.providers.get(&network).ok_or_else(|| {
            IndexerError::configuration(format!("Provider not configured for network {network}"))
        })?;

        let urls = match kind {
            ProviderKind::Http => endpoints.http.clone(),
            ProviderKind::Ws => endpoints.ws.iter().cloned().collect(),
        };

        if urls.is_empty() {
            return Err(IndexerError::configuration(format!(
                "Provider kind {kind} not configured for network {network}"
            )));
        }
        Ok(urls)
    }

    /// HTTP client for queries.
    pub fn rpc_client(&self) -> Result<RpcClient> {
        self.rpc.clone().ok_or_else(|| {
            IndexerError::configuration(format!(
                "Provider kind {} not configured for network {}",
                ProviderKind::Http,
                self.network()
            ))
            .into()
        })
    }

    /// Opens a fresh WebSocket connection for subscriptions.
    pub async fn ws_provider(&self) -> Result<DynProvider> {
        let url = self.provider_urls(ProviderKind::Ws)?.remove(0);
        connect_ws(&url).await
    }

    /// Per-network key, falling back to the default key unless `strict`.
    pub fn signer(&self, strict: bool) -> Result<PrivateKeySigner, IndexerError> {
        let network = self.network();
        let network_key = self.config.signing_keys.get(&network);

        if strict && network_key.is_none() {
            return Err(IndexerError::configuration(format!(
                "Signing key not configured for network {network}"
            )));
        }

        let key = network_key
            .or(self.config.default_signing_key.as_ref())
            .ok_or_else(|| {
                IndexerError::configuration(format!(
                    "No signing key resolves for network {network}"
                ))
            })?;

        key.trim().parse::<PrivateKeySigner>().map_err(|e| {
            IndexerError::configuration(format!("Invalid signing key for network {network}: {e}"))
        })
    }

    pub async fn latest_block_number(&self) -> Result<u64> {
        self.rpc_client()?.get_latest_block().await
    }

    pub async fn block_by_number(&self, block_number: u64) -> Result<Option<Block>> {
        self.rpc_client()?.get_block(block_number).await
    }

    /// Runs `executor` through the process-wide pipeline.
    pub async fn send_transaction<F>(&self, executor: F) -> Result<TransactionReceipt>
    where
        F: Future<Output = Result<TransactionReceipt>> + Send + 'static,
    {
        self.pipeline.submit(executor).await
    }
}

pub async fn connect_ws(url: &str) -> Result<DynProvider> {
    let provider = ProviderBuilder::new()
        .connect_ws(WsConnect::new(url))
        .await
        .map_err(|e| IndexerError::transient(format!("WebSocket connect to {url} failed: {e}")))?;
    info!("WebSocket provider connected");
    Ok(provider.erased())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContractAddresses, ProviderEndpoints};
    use std::collections::HashMap;

    const DEFAULT_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
    const TESTNET_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

    fn ledger_config(network: Network) -> LedgerConfig {
        let mut providers = HashMap::new();
        providers.insert(
            Network::Testnet,
            ProviderEndpoints {
                http: vec!["http://localhost:8545".to_string()],
                ws: None,
            },
        );
        let mut signing_keys = HashMap::new();
        signing_keys.insert(Network::Testnet, TESTNET_KEY.to_string());

        LedgerConfig {
            network,
            providers,
            default_signing_key: Some(DEFAULT_KEY.to_string()),
            signing_keys,
            contracts: ContractAddresses::default(),
        }
    }

    fn gateway_for(network: Network) -> ChainGateway {
        ChainGateway::new(ledger_config(network), TransactionPipeline::new()).unwrap()
    }

    #[tokio::test]
    async fn resolves_configured_http_endpoint() {
        let gateway = gateway_for(Network::Testnet);
        assert_eq!(
            gateway.provider_urls(ProviderKind::Http).unwrap(),
            vec!["http://localhost:8545"]
        );
        assert!(gateway.rpc_client().is_ok());
    }

    #[tokio::test]
    async fn missing_endpoint_is_a_configuration_error() {
        let gateway = gateway_for(Network::Testnet);
        assert!(matches!(
            gateway.provider_urls(ProviderKind::Ws),
            Err(IndexerError::Configuration(_))
        ));

        let devnet = gateway_for(Network::Devnet);
        let err = devnet.rpc_client().err().unwrap();
        assert!(matches!(
            IndexerError::find(&err),
            Some(IndexerError::Configuration(_))
        ));
        assert!(devnet.ws_provider().await.is_err());
    }

    #[tokio::test]
    async fn signer_prefers_network_key_and_falls_back_when_lenient() {
        let testnet = gateway_for(Network::Testnet);
        let expected: PrivateKeySigner = TESTNET_KEY.parse().unwrap();
        assert_eq!(testnet.signer(true).unwrap().address(), expected.address());

        let devnet = gateway_for(Network::Devnet);
        assert!(matches!(
            devnet.signer(true),
            Err(IndexerError::Configuration(_))
        ));
        let fallback: PrivateKeySigner = DEFAULT_KEY.parse().unwrap();
        assert_eq!(devnet.signer(false).unwrap().address(), fallback.address());
    }

    #[tokio::test]
    async fn unparseable_key_is_a_configuration_error() {
        let mut config = ledger_config(Network::Devnet);
        config.default_signing_key = Some("not-a-key".to_string());
        let gateway = ChainGateway::new(config, TransactionPipeline::new()).unwrap();
        assert!(matches!(gateway.signer(false), Err(IndexerError::Configuration(_))));
    }
}
