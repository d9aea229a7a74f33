use alloy::rpc::types::Log;
use alloy::sol;
use alloy::sol_types::SolEvent;
use alloy_primitives::{Address, B256, U256};
use anyhow::{Context, Result};
use std::fmt;
use std::str::FromStr;

sol! {
    #[sol(rpc)]
    interface IERC20 {
        event Transfer(address indexed from, address indexed to, uint256 value);

        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
    }

    #[sol(rpc)]
    interface IERC721 {
        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);

        function name() external view returns (string);
        function symbol() external view returns (string);
        function ownerOf(uint256 tokenId) external view returns (address);
        function transferFrom(address from, address to, uint256 tokenId) external;
    }

    #[sol(rpc)]
    interface IERC1155 {
        event TransferSingle(address indexed operator, address indexed from, address indexed to, uint256 id, uint256 value);

        function balanceOf(address account, uint256 id) external view returns (uint256);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenStandard {
    Erc20,
    Erc721,
    /// Bindable, but never synchronized.
    Erc1155,
}

impl TokenStandard {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenStandard::Erc20 => "ERC20",
            TokenStandard::Erc721 => "ERC721",
            TokenStandard::Erc1155 => "ERC1155",
        }
    }

    /// topic0 of the transfer event this standard emits.
    pub fn transfer_topic(&self) -> B256 {
        match self {
            TokenStandard::Erc20 => IERC20::Transfer::SIGNATURE_HASH,
            TokenStandard::Erc721 => IERC721::Transfer::SIGNATURE_HASH,
            TokenStandard::Erc1155 => IERC1155::TransferSingle::SIGNATURE_HASH,
        }
    }
}

impl fmt::Display for TokenStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenStandard {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().replace('-', "").as_str() {
            "ERC20" => Ok(TokenStandard::Erc20),
            "ERC721" => Ok(TokenStandard::Erc721),
            "ERC1155" => Ok(TokenStandard::Erc1155),
            other => Err(anyhow::anyhow!("Unrecognized token type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferValue {
    TokenId(U256),
    Amount(U256),
}

/// A decoded transfer log, ready to be applied to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferLog {
    pub transaction_hash: B256,
    pub log_index: u64,
    pub block_number: u64,
    pub token_address: Address,
    pub from: Address,
    pub to: Address,
    pub value: TransferValue,
}

impl TransferLog {
    pub fn is_mint(&self) -> bool {
        self.from == Address::ZERO
    }
}

/// ERC-20 and ERC-721 share topic0; the number of indexed topics tells them apart,
/// so decoding with the wrong standard fails instead of misreading the payload.
pub fn decode_transfer_event(standard: TokenStandard, log: &Log) -> Result<TransferLog> {
    let log_data = log.data();
    let (from, to, value) = match standard {
        TokenStandard::Erc20 => {
            let decoded = IERC20::Transfer::decode_raw_log(log.topics(), &log_data.data)?;
            (decoded.from, decoded.to, TransferValue::Amount(decoded.value))
        }
        TokenStandard::Erc721 => {
            let decoded = IERC721::Transfer::decode_raw_log(log.topics(), &log_data.data)?;
            (decoded.from, decoded.to, TransferValue::TokenId(decoded.tokenId))
        }
        TokenStandard::Erc1155 => {
            anyhow::bail!("ERC1155 transfers are not indexed");
        }
    };

    Ok(TransferLog {
        transaction_hash: log
            .transaction_hash
            .context("Log is missing its transaction hash")?,
        log_index: log.log_index.context("Log is missing its index")?,
        block_number: log.block_number.context("Log is missing its block number")?,
        token_address: log.address(),
        from,
        to,
        value,
    })
}
