use super::models::{Token, TokenInfo, address_column, address_key};
use alloy_primitives::Address;
use anyhow::{Context, Result};
use num_bigint::BigInt;
use rusqlite::{OptionalExtension, Row, params};
use std::str::FromStr;

pub struct TokenRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> TokenRepository<'a> {
    const INSERT_TOKEN: &'static str = "INSERT OR IGNORE INTO tokens (
            address, name, symbol, type, total_supply, total_holders, synced_till_block
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

    const SELECT_TOKEN: &'static str = "SELECT address, name, symbol, type, total_supply, total_holders, synced_till_block FROM tokens";

    const UPDATE_SYNCED_TILL_BLOCK: &'static str =
        "UPDATE tokens SET synced_till_block = ?1 WHERE address = ?2";

    const UPDATE_AFTER_TRANSFER: &'static str =
        "UPDATE tokens SET total_holders = ?1, synced_till_block = ?2 WHERE address = ?3";

    const COUNT_TRANSFERS: &'static str =
        "SELECT COUNT(*) FROM token_transfers WHERE token_address = ?1";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// Returns 0 when a token with the same address already exists.
    pub fn insert(&self, token: &Token) -> Result<usize> {
        let inserted = self.conn.execute(
            Self::INSERT_TOKEN,
            params![
                address_key(&token.address),
                token.name,
                token.symbol,
                token.token_type,
                token.total_supply,
                token.total_holders,
                token.synced_till_block,
            ],
        )?;
        Ok(inserted)
    }

    pub fn count(&self) -> Result<u64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM tokens", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn get(&self, address: &Address) -> Result<Option<Token>> {
        let query = format!("{} WHERE address = ?1", Self::SELECT_TOKEN);
        let token = self
            .conn
            .query_row(&query, params![address_key(address)], Self::row_to_token)
            .optional()?;
        Ok(token)
    }

    pub fn get_all(&self) -> Result<Vec<Token>> {
        let query = format!("{} ORDER BY address", Self::SELECT_TOKEN);
        let mut stmt = self.conn.prepare(&query)?;
        let tokens = stmt
            .query_map([], Self::row_to_token)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tokens)
    }

    pub fn all_addresses(&self) -> Result<Vec<Address>> {
        let mut stmt = self.conn.prepare("SELECT address FROM tokens ORDER BY address")?;
        let addresses = stmt
            .query_map([], |row| address_column(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(addresses)
    }

    /// Token plus its derived transfer count.
    pub fn get_info(&self, address: &Address) -> Result<Option<TokenInfo>> {
        let Some(token) = self.get(address)? else {
            return Ok(None);
        };
        let total_transfers = self.conn.query_row(
            Self::COUNT_TRANSFERS,
            params![address_key(address)],
            |row| row.get(0),
        )?;
        Ok(Some(TokenInfo {
            token,
            total_transfers,
        }))
    }

    pub fn update_synced_till_block(&self, address: &Address, block_number: u64) -> Result<()> {
        self.conn.execute(
            Self::UPDATE_SYNCED_TILL_BLOCK,
            params![block_number, address_key(address)],
        )?;
        Ok(())
    }

    pub fn update_after_transfer(
        &self,
        address: &Address,
        total_holders: u64,
        block_number: u64,
    ) -> Result<()> {
        self.conn.execute(
            Self::UPDATE_AFTER_TRANSFER,
            params![total_holders, block_number, address_key(address)],
        )?;
        Ok(())
    }

    pub fn increment_total_supply(&self, address: &Address) -> Result<()> {
        let key = address_key(address);
        let current: String = self.conn.query_row(
            "SELECT total_supply FROM tokens WHERE address = ?1",
            params![key],
            |row| row.get(0),
        )?;
        let supply = BigInt::from_str(&current)
            .with_context(|| format!("Invalid total supply {current} for token {key}"))?;

        self.conn.execute(
            "UPDATE tokens SET total_supply = ?1 WHERE address = ?2",
            params![(supply + 1u32).to_string(), key],
        )?;
        Ok(())
    }

    fn row_to_token(row: &Row) -> rusqlite::Result<Token> {
        Ok(Token {
            address: address_column(row, 0)?,
            name: row.get(1)?,
            symbol: row.get(2)?,
            token_type: row.get(3)?,
            total_supply: row.get(4)?,
            total_holders: row.get(5)?,
            synced_till_block: row.get(6)?,
        })
    }
}
