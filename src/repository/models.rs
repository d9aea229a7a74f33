use crate::events::{TokenStandard, TransferLog};
use alloy_primitives::{Address, B256, U256};
use num_bigint::{BigInt, Sign};
use serde::Serialize;
use std::str::FromStr;

/// Transfers are stored exactly as decoded.
pub type TokenTransfer = TransferLog;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    /// Stored verbatim; only ERC20 and ERC721 are synchronized.
    #[serde(rename = "type")]
    pub token_type: String,
    pub total_supply: String,
    pub total_holders: u64,
    pub synced_till_block: u64,
}

impl Token {
    pub fn standard(&self) -> Option<TokenStandard> {
        self.token_type.parse().ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    #[serde(flatten)]
    pub token: Token,
    pub total_transfers: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HolderBalance {
    /// ERC-721: number of token ids owned.
    Units(u64),
    /// ERC-20: cumulative amount.
    Amount(BigInt),
}

impl std::fmt::Display for HolderBalance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HolderBalance::Units(units) => write!(f, "{units}"),
            HolderBalance::Amount(amount) => write!(f, "{amount}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHolder {
    pub account: Address,
    pub balance: HolderBalance,
}

pub(crate) fn address_key(address: &Address) -> String {
    format!("{address:?}")
}

pub(crate) fn hash_key(hash: &B256) -> String {
    format!("{hash:?}")
}

pub(crate) fn u256_to_bigint(value: &U256) -> BigInt {
    BigInt::from_bytes_be(Sign::Plus, &value.to_be_bytes::<32>())
}

fn conversion_error<E>(index: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(err))
}

pub(crate) fn address_column(row: &rusqlite::Row, index: usize) -> rusqlite::Result<Address> {
    Address::from_str(&row.get::<_, String>(index)?).map_err(|e| conversion_error(index, e))
}

pub(crate) fn hash_column(row: &rusqlite::Row, index: usize) -> rusqlite::Result<B256> {
    row.get::<_, String>(index)?
        .parse::<B256>()
        .map_err(|e| conversion_error(index, e))
}

pub(crate) fn u256_column(row: &rusqlite::Row, index: usize) -> rusqlite::Result<U256> {
    U256::from_str(&row.get::<_, String>(index)?).map_err(|e| conversion_error(index, e))
}

pub(crate) fn bigint_column(row: &rusqlite::Row, index: usize) -> rusqlite::Result<BigInt> {
    BigInt::from_str(&row.get::<_, String>(index)?).map_err(|e| conversion_error(index, e))
}
