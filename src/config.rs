use crate::events::TokenStandard;
use crate::retry::RetryPolicy;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Devnet,
    Testnet,
    Mainnet,
}

impl Network {
    pub const ALL: [Network; 3] = [Network::Devnet, Network::Testnet, Network::Mainnet];

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Devnet => "devnet",
            Network::Testnet => "testnet",
            Network::Mainnet => "mainnet",
        }
    }

    fn env_prefix(&self) -> &'static str {
        match self {
            Network::Devnet => "DEVNET",
            Network::Testnet => "TESTNET",
            Network::Mainnet => "MAINNET",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "devnet" => Ok(Network::Devnet),
            "testnet" => Ok(Network::Testnet),
            "mainnet" => Ok(Network::Mainnet),
            other => Err(anyhow::anyhow!("Unknown network: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Http,
    Ws,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Http => f.write_str("http"),
            ProviderKind::Ws => f.write_str("ws"),
        }
    }
}

/// Endpoints for one network. HTTP may list several URLs for rotation.
#[derive(Debug, Clone, Default)]
pub struct ProviderEndpoints {
    pub http: Vec<String>,
    pub ws: Option<String>,
}

/// Raw per-network contract addresses, validated by the contract proxy.
pub type AddressDictionary = HashMap<Network, String>;

#[derive(Debug, Clone, Default)]
pub struct ContractAddresses {
    pub erc20: AddressDictionary,
    pub erc721: AddressDictionary,
    pub erc1155: AddressDictionary,
}

impl ContractAddresses {
    pub fn for_standard(&self, standard: TokenStandard) -> &AddressDictionary {
        match standard {
            TokenStandard::Erc20 => &self.erc20,
            TokenStandard::Erc721 => &self.erc721,
            TokenStandard::Erc1155 => &self.erc1155,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub network: Network,
    pub providers: HashMap<Network, ProviderEndpoints>,
    pub default_signing_key: Option<String>,
    pub signing_keys: HashMap<Network, String>,
    pub contracts: ContractAddresses,
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub interval: Duration,
    pub jitter: Duration,
    pub window_blocks: u64,
    pub subscription_reconnect: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            jitter: Duration::ZERO,
            window_blocks: 100_000,
            subscription_reconnect: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub ledger: LedgerConfig,
    pub database_url: String,
    pub scanner_database_url: String,
    pub sync: SyncSettings,
    pub retry: RetryPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let network = match var("NETWORK") {
            Some(raw) => raw.parse().context("Invalid NETWORK")?,
            None => Network::Devnet,
        };

        let mut providers = HashMap::new();
        let mut signing_keys = HashMap::new();
        let mut contracts = ContractAddresses::default();

        for net in Network::ALL {
            let prefix = net.env_prefix();
            let http = var(&format!("{prefix}_HTTP_PROVIDER"))
                .map(|raw| {
                    raw.split(',')
                        .map(|url| url.trim().to_string())
                        .filter(|url| !url.is_empty())
                        .collect()
                })
                .unwrap_or_default();
            let ws = var(&format!("{prefix}_WS_PROVIDER"));
            providers.insert(net, ProviderEndpoints { http, ws });

            if let Some(key) = var(&format!("{prefix}_SIGNING_KEY")) {
                signing_keys.insert(net, key);
            }
            if let Some(address) = var(&format!("ERC20_ADDRESS_{prefix}")) {
                contracts.erc20.insert(net, address);
            }
            if let Some(address) = var(&format!("ERC721_ADDRESS_{prefix}")) {
                contracts.erc721.insert(net, address);
            }
            if let Some(address) = var(&format!("ERC1155_ADDRESS_{prefix}")) {
                contracts.erc1155.insert(net, address);
            }
        }

        let database_url = var("DATABASE_URL").unwrap_or_else(|| "sqlite:./indexer.db".to_string());
        let scanner_database_url =
            var("SCANNER_DATABASE_URL").unwrap_or_else(|| "sqlite:./scanner.db".to_string());

        let defaults = SyncSettings::default();
        let sync = SyncSettings {
            interval: Duration::from_secs(parse_or(
                &var,
                "SYNC_INTERVAL_SECS",
                defaults.interval.as_secs(),
            )?),
            jitter: Duration::from_millis(parse_or(&var, "SYNC_JITTER_MS", 0)?),
            window_blocks: parse_or(&var, "SYNC_WINDOW_BLOCKS", defaults.window_blocks)?,
            subscription_reconnect: Duration::from_secs(parse_or(
                &var,
                "SUBSCRIPTION_RECONNECT_SECS",
                defaults.subscription_reconnect.as_secs(),
            )?),
        };

        let retry_defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_retries: parse_or(&var, "RETRY_MAX_ATTEMPTS", retry_defaults.max_retries)?,
            base_delay_ms: parse_or(&var, "RETRY_BASE_DELAY_MS", retry_defaults.base_delay_ms)?,
            max_delay: Duration::from_millis(parse_or(
                &var,
                "RETRY_MAX_DELAY_MS",
                retry_defaults.max_delay.as_millis() as u64,
            )?),
        };

        Ok(Config {
            ledger: LedgerConfig {
                network,
                providers,
                default_signing_key: var("SIGNING_KEY"),
                signing_keys,
                contracts,
            },
            database_url,
            scanner_database_url,
            sync,
            retry,
        })
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {key}: {raw}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.ledger.network, Network::Devnet);
        assert_eq!(config.database_url, "sqlite:./indexer.db");
        assert_eq!(config.scanner_database_url, "sqlite:./scanner.db");
        assert_eq!(config.sync.interval, Duration::from_secs(5));
        assert_eq!(config.sync.window_blocks, 100_000);
        assert_eq!(config.sync.subscription_reconnect, Duration::from_secs(300));
        assert!(config.ledger.providers[&Network::Devnet].http.is_empty());
    }

    #[test]
    fn per_network_values_are_read() {
        let config = Config::from_lookup(lookup_from(&[
            ("NETWORK", "Mainnet"),
            ("MAINNET_HTTP_PROVIDER", "http://a, http://b"),
            ("MAINNET_WS_PROVIDER", "ws://a"),
            ("MAINNET_SIGNING_KEY", "0xabc"),
            ("ERC721_ADDRESS_MAINNET", "0x0000000000000000000000000000000000000001"),
            ("SYNC_WINDOW_BLOCKS", "500"),
        ]))
        .unwrap();

        assert_eq!(config.ledger.network, Network::Mainnet);
        let endpoints = &config.ledger.providers[&Network::Mainnet];
        assert_eq!(endpoints.http, vec!["http://a", "http://b"]);
        assert_eq!(endpoints.ws.as_deref(), Some("ws://a"));
        assert_eq!(config.ledger.signing_keys[&Network::Mainnet], "0xabc");
        assert!(config.ledger.contracts.erc721.contains_key(&Network::Mainnet));
        assert_eq!(config.sync.window_blocks, 500);
    }

    #[test]
    fn rejects_unknown_network() {
        assert!(Config::from_lookup(lookup_from(&[("NETWORK", "moonnet")])).is_err());
    }

    #[test]
    fn rejects_malformed_numbers() {
        assert!(Config::from_lookup(lookup_from(&[("SYNC_INTERVAL_SECS", "soon")])).is_err());
    }
}
