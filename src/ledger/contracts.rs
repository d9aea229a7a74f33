use crate::config::{AddressDictionary, LedgerConfig, Network};
use crate::error::IndexerError;
use crate::events::{IERC20, IERC721, IERC1155, TokenStandard};
use crate::ledger::subscription::{EventSubscription, WsLogConnector};
use alloy::providers::DynProvider;
use alloy::rpc::types::Filter;
use alloy_primitives::Address;
use anyhow::Result;
use std::str::FromStr;
use std::time::Duration;

/// Parses a `0x`-prefixed, 20-byte hex address. Mixed-case input must carry
/// a valid EIP-55 checksum.
pub fn parse_address(raw: &str) -> Option<Address> {
    let trimmed = raw.trim();
    let hex = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X"))?;
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let has_lower = hex.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = hex.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        return Address::parse_checksummed(format!("0x{hex}"), None).ok();
    }
    Address::from_str(hex).ok()
}

/// Log filter for one contract's transfer events.
pub fn transfer_filter(standard: TokenStandard, address: Address) -> Filter {
    Filter::new()
        .address(address)
        .event_signature(standard.transfer_topic())
}

/// A token contract bound to a provider.
pub enum ContractBinding {
    Erc20(IERC20::IERC20Instance<DynProvider>),
    Erc721(IERC721::IERC721Instance<DynProvider>),
    Erc1155(IERC1155::IERC1155Instance<DynProvider>),
}

impl ContractBinding {
    /// No validation: the caller owns the address.
    pub fn at(standard: TokenStandard, address: Address, provider: DynProvider) -> Self {
        match standard {
            TokenStandard::Erc20 => ContractBinding::Erc20(IERC20::new(address, provider)),
            TokenStandard::Erc721 => ContractBinding::Erc721(IERC721::new(address, provider)),
            TokenStandard::Erc1155 => ContractBinding::Erc1155(IERC1155::new(address, provider)),
        }
    }

    pub fn standard(&self) -> TokenStandard {
        match self {
            ContractBinding::Erc20(_) => TokenStandard::Erc20,
            ContractBinding::Erc721(_) => TokenStandard::Erc721,
            ContractBinding::Erc1155(_) => TokenStandard::Erc1155,
        }
    }

    pub fn address(&self) -> Address {
        match self {
            ContractBinding::Erc20(instance) => *instance.address(),
            ContractBinding::Erc721(instance) => *instance.address(),
            ContractBinding::Erc1155(instance) => *instance.address(),
        }
    }

    /// `(name, symbol)` as reported by the contract.
    pub async fn metadata(&self) -> Result<(String, String)> {
        match self {
            ContractBinding::Erc20(instance) => {
                let name = instance.name().call().await?;
                let symbol = instance.symbol().call().await?;
                Ok((name, symbol))
            }
            ContractBinding::Erc721(instance) => {
                let name = instance.name().call().await?;
                let symbol = instance.symbol().call().await?;
                Ok((name, symbol))
            }
            ContractBinding::Erc1155(_) => {
                anyhow::bail!("ERC1155 contracts expose no name or symbol")
            }
        }
    }
}

/// Per-standard contract access for one network: address resolution, binding
/// and live event subscription.
#[derive(Debug, Clone)]
pub struct ContractProxy {
    standard: TokenStandard,
    network: Network,
    addresses: AddressDictionary,
}

impl ContractProxy {
    pub fn new(standard: TokenStandard, network: Network, addresses: AddressDictionary) -> Self {
        Self {
            standard,
            network,
            addresses,
        }
    }

    pub fn from_config(standard: TokenStandard, config: &LedgerConfig) -> Self {
        Self::new(
            standard,
            config.network,
            config.contracts.for_standard(standard).clone(),
        )
    }

    pub fn standard(&self) -> TokenStandard {
        self.standard
    }

    pub fn instance_at(&self, address: Address, provider: DynProvider) -> ContractBinding {
        ContractBinding::at(self.standard, address, provider)
    }

    /// Registered address for the proxy's network. Strict mode fails when
    /// nothing valid is registered; lenient mode answers the zero address.
    pub fn address(&self, strict: bool) -> Result<Address, IndexerError> {
        let raw = self.addresses.get(&self.network);
        match raw.and_then(|raw| parse_address(raw)) {
            Some(address) => Ok(address),
            None if strict => Err(IndexerError::configuration(format!(
                "Invalid {} address for network {}, found {:?}",
                self.standard, self.network, raw
            ))),
            None => Ok(Address::ZERO),
        }
    }

    /// Address worth subscribing to, if any.
    pub fn live_address(&self) -> Option<Address> {
        self.address(false)
            .ok()
            .filter(|address| *address != Address::ZERO)
    }

    /// Subscription over `ws_url` for this proxy's transfers, if a live address
    /// is registered. The caller drives it with [`EventSubscription::run`].
    pub fn subscribe(
        &self,
        ws_url: &str,
        reconnect_every: Duration,
    ) -> Option<EventSubscription<WsLogConnector>> {
        let address = self.live_address()?;
        Some(EventSubscription::new(
            WsLogConnector::new(ws_url),
            transfer_filter(self.standard, address),
            self.standard,
            reconnect_every,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::providers::{Provider, ProviderBuilder};
    use std::collections::HashMap;

    const REGISTERED: &str = "0xa7060b2ac04c9b4d6bfc2d688953fc959ef07c6e";

    fn proxy(network: Network, registered: Option<&str>) -> ContractProxy {
        let mut addresses = HashMap::new();
        if let Some(raw) = registered {
            addresses.insert(Network::Testnet, raw.to_string());
        }
        ContractProxy::new(TokenStandard::Erc721, network, addresses)
    }

    #[test]
    fn validates_address_shape() {
        assert!(parse_address(REGISTERED).is_some());
        assert!(parse_address("0xA7060B2AC04C9B4D6BFC2D688953FC959EF07C6E").is_some());
        assert!(parse_address("a7060b2ac04c9b4d6bfc2d688953fc959ef07c6e").is_none());
        assert!(parse_address("0x1234").is_none());
        assert!(parse_address("0xZZ060b2ac04c9b4d6bfc2d688953fc959ef07c6e").is_none());
    }

    #[test]
    fn mixed_case_requires_valid_checksum() {
        let address = parse_address(REGISTERED).unwrap();
        let checksummed = address.to_checksum(None);
        assert_eq!(parse_address(&checksummed), Some(address));

        // flip the case of one letter after the prefix
        let position = checksummed[2..]
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap()
            + 2;
        let mut broken = checksummed.clone();
        let flipped = if checksummed.as_bytes()[position].is_ascii_uppercase() {
            checksummed[position..=position].to_ascii_lowercase()
        } else {
            checksummed[position..=position].to_ascii_uppercase()
        };
        broken.replace_range(position..=position, &flipped);
        assert_eq!(parse_address(&broken), None);
    }

    #[test]
    fn bound_instance_keeps_standard_and_address() {
        let provider = ProviderBuilder::new()
            .connect_http("http://localhost:8545".parse().unwrap())
            .erased();
        let proxy = proxy(Network::Testnet, Some(REGISTERED));
        let address = proxy.address(true).unwrap();

        let binding = proxy.instance_at(address, provider);
        assert_eq!(binding.standard(), TokenStandard::Erc721);
        assert_eq!(binding.address(), address);
    }

    #[test]
    fn transfer_filter_matches_contract_and_topic() {
        let address = parse_address(REGISTERED).unwrap();
        let filter = transfer_filter(TokenStandard::Erc20, address);
        assert!(filter.address.matches(&address));
        assert!(!filter.address.matches(&Address::ZERO));
        assert!(filter.topics[0].matches(&TokenStandard::Erc20.transfer_topic()));
    }

    #[test]
    fn resolves_registered_address() {
        let proxy = proxy(Network::Testnet, Some(REGISTERED));
        let address = proxy.address(true).unwrap();
        assert_eq!(address, parse_address(REGISTERED).unwrap());
        assert_eq!(proxy.live_address(), Some(address));
    }

    #[test]
    fn strict_lookup_fails_without_registration() {
        let proxy = proxy(Network::Mainnet, Some(REGISTERED));
        assert!(matches!(
            proxy.address(true),
            Err(IndexerError::Configuration(_))
        ));
        assert_eq!(proxy.address(false).unwrap(), Address::ZERO);
        assert_eq!(proxy.live_address(), None);
    }

    #[test]
    fn invalid_registration_is_treated_as_missing() {
        let proxy = proxy(Network::Testnet, Some("not-an-address"));
        assert!(proxy.address(true).is_err());
        assert_eq!(proxy.address(false).unwrap(), Address::ZERO);
    }

    #[test]
    fn zero_address_registration_is_not_subscribed() {
        let proxy = proxy(
            Network::Testnet,
            Some("0x0000000000000000000000000000000000000000"),
        );
        assert_eq!(proxy.address(true).unwrap(), Address::ZERO);
        assert!(
            proxy
                .subscribe("ws://localhost:8546", Duration::from_secs(300))
                .is_none()
        );
    }
}
