use crate::error::IndexerError;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Block, BlockNumberOrTag, Filter, Log};
use alloy_primitives::{Address, B256};
use anyhow::Result;
use regex::Regex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120); // 2 minutes timeout per request

/// HTTP JSON-RPC client over one or more endpoints of the same network.
///
/// Failures rotate to the next endpoint; retrying is left to the caller's policy.
#[derive(Clone)]
pub struct RpcClient {
    providers: Vec<DynProvider>,
    urls: Vec<String>,
    current_provider: Arc<AtomicUsize>,
}

impl RpcClient {
    pub fn new(rpc_urls: &[String]) -> Result<Self> {
        if rpc_urls.is_empty() {
            return Err(IndexerError::configuration("At least one RPC URL must be provided").into());
        }

        let mut providers = Vec::new();
        for url in rpc_urls {
            let parsed_url = url
                .parse()
                .map_err(|_| IndexerError::configuration(format!("Invalid RPC URL: {url}")))?;
            providers.push(ProviderBuilder::new().connect_http(parsed_url).erased());
        }

        Ok(RpcClient {
            providers,
            urls: rpc_urls.to_vec(),
            current_provider: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn provider(&self) -> &DynProvider {
        let index = self.current_provider.load(Ordering::Relaxed) % self.providers.len();
        &self.providers[index]
    }

    pub fn get_current_url(&self) -> &str {
        let index = self.current_provider.load(Ordering::Relaxed) % self.urls.len();
        &self.urls[index]
    }

    pub fn rotate_provider(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.providers.len();
        self.current_provider.store(next, Ordering::Relaxed);

        if self.providers.len() > 1 {
            debug!("Rotating to RPC provider #{}", next);
        }
    }

    fn handle_error(&self, error_str: &str) -> anyhow::Error {
        let current_url = self.get_current_url();
        warn!(
            "RPC error on {}: {}, rotating provider",
            current_url, error_str
        );
        self.rotate_provider();
        IndexerError::transient(error_str.to_string()).into()
    }

    fn handle_timeout(&self) -> anyhow::Error {
        let current_url = self.get_current_url();
        warn!(
            "Request timeout after {} seconds on {}, rotating provider",
            REQUEST_TIMEOUT.as_secs(),
            current_url
        );
        self.rotate_provider();
        IndexerError::transient(format!(
            "Request timeout after {} seconds",
            REQUEST_TIMEOUT.as_secs()
        ))
        .into()
    }

    pub async fn get_latest_block(&self) -> Result<u64> {
        let provider = self.provider();
        match timeout(REQUEST_TIMEOUT, provider.get_block_number()).await {
            Ok(Ok(block_number)) => Ok(block_number),
            Ok(Err(e)) => Err(self.handle_error(&e.to_string())),
            Err(_) => Err(self.handle_timeout()),
        }
    }

    pub async fn get_block(&self, block_number: u64) -> Result<Option<Block>> {
        let provider = self.provider();
        let future = provider.get_block_by_number(BlockNumberOrTag::Number(block_number));
        match timeout(REQUEST_TIMEOUT, future).await {
            Ok(Ok(block)) => Ok(block),
            Ok(Err(e)) => Err(self.handle_error(&e.to_string())),
            Err(_) => Err(self.handle_timeout()),
        }
    }

    async fn get_logs_internal(
        &self,
        from_block: u64,
        to_block: u64,
        contract_address: Address,
        topic0: B256,
    ) -> Result<Vec<Log>> {
        let provider = self.provider();
        let filter = Filter::new()
            .address(contract_address)
            .event_signature(topic0)
            .from_block(from_block)
            .to_block(to_block);

        match timeout(REQUEST_TIMEOUT, provider.get_logs(&filter)).await {
            Ok(Ok(logs)) => Ok(logs),
            Ok(Err(e)) => {
                let error_str = e.to_string();
                if error_str.contains("exceeds max results") {
                    // not a node failure, the caller splits the range
                    debug!(
                        "Max results exceeded for blocks {}-{}, will split range",
                        from_block, to_block
                    );
                    Err(IndexerError::transient(error_str).into())
                } else {
                    Err(self.handle_error(&error_str))
                }
            }
            Err(_) => Err(self.handle_timeout()),
        }
    }

    fn parse_max_results_error(error_str: &str) -> Option<(u64, u64)> {
        let re = Regex::new(r"retry with the range (\d+)-(\d+)").ok()?;
        let captures = re.captures(error_str)?;

        let from = captures.get(1)?.as_str().parse().ok()?;
        let to = captures.get(2)?.as_str().parse().ok()?;

        Some((from, to))
    }

    /// Fetches logs for `[from_block, to_block]`, following the node's suggested
    /// sub-ranges when a single request would return too many results.
    pub async fn get_logs(
        &self,
        from_block: u64,
        to_block: u64,
        contract_address: Address,
        topic0: B256,
    ) -> Result<Vec<Log>> {
        let mut all_logs = Vec::new();
        let mut current_from = from_block;

        while current_from <= to_block {
            match self
                .get_logs_internal(current_from, to_block, contract_address, topic0)
                .await
            {
                Ok(logs) => {
                    all_logs.extend(logs);
                    break;
                }
                Err(e) => {
                    let error_str = e.to_string();
                    let Some((suggested_from, suggested_to)) =
                        Self::parse_max_results_error(&error_str)
                    else {
                        return Err(e);
                    };

                    info!(
                        "Hit max results limit for blocks {}-{}, splitting at block {}",
                        current_from, to_block, suggested_to
                    );

                    let logs = self
                        .get_logs_internal(suggested_from, suggested_to, contract_address, topic0)
                        .await?;

                    all_logs.extend(logs);
                    current_from = suggested_to + 1;
                }
            }
        }

        Ok(all_logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_suggested_range() {
        let msg = "query exceeds max results 10000, retry with the range 100-250";
        assert_eq!(RpcClient::parse_max_results_error(msg), Some((100, 250)));
        assert_eq!(RpcClient::parse_max_results_error("connection reset"), None);
    }

    #[test]
    fn requires_an_endpoint() {
        let err = RpcClient::new(&[]).err().unwrap();
        assert!(matches!(
            IndexerError::find(&err),
            Some(IndexerError::Configuration(_))
        ));
    }

    #[test]
    fn rotates_between_endpoints() {
        let client = RpcClient::new(&[
            "http://localhost:8545".to_string(),
            "http://localhost:8546".to_string(),
        ])
        .unwrap();

        assert_eq!(client.get_current_url(), "http://localhost:8545");
        client.rotate_provider();
        assert_eq!(client.get_current_url(), "http://localhost:8546");
        client.rotate_provider();
        assert_eq!(client.get_current_url(), "http://localhost:8545");
    }
}
