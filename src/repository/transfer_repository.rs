use super::models::{
    TokenTransfer, address_column, address_key, hash_column, hash_key, u256_column,
};
use crate::events::{TokenStandard, TransferValue};
use alloy_primitives::{Address, B256};
use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params};

pub struct TransferRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> TransferRepository<'a> {
    const INSERT_TRANSFER: &'static str = "INSERT INTO token_transfers (
            tx_hash, log_index, block_number, from_address, to_address,
            token_address, token_id, amount
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

    const SELECT_TRANSFER: &'static str = "SELECT t.tx_hash, t.log_index, t.block_number, t.from_address, t.to_address, t.token_address, t.token_id, t.amount FROM token_transfers t";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn exists(&self, tx_hash: &B256, log_index: u64) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM token_transfers WHERE tx_hash = ?1 AND log_index = ?2",
                params![hash_key(tx_hash), log_index],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Fails on a duplicate `(tx_hash, log_index)`; callers check [`Self::exists`] first.
    pub fn insert(&self, transfer: &TokenTransfer) -> Result<()> {
        let (token_id, amount) = match &transfer.value {
            TransferValue::TokenId(id) => (Some(id.to_string()), None),
            TransferValue::Amount(amount) => (None, Some(amount.to_string())),
        };

        self.conn.execute(
            Self::INSERT_TRANSFER,
            params![
                hash_key(&transfer.transaction_hash),
                transfer.log_index,
                transfer.block_number,
                address_key(&transfer.from),
                address_key(&transfer.to),
                address_key(&transfer.token_address),
                token_id,
                amount,
            ],
        )?;
        Ok(())
    }

    pub fn count_for_token(&self, token_address: &Address) -> Result<u64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM token_transfers WHERE token_address = ?1",
            params![address_key(token_address)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn for_token(&self, token_address: &Address) -> Result<Vec<TokenTransfer>> {
        let query = format!(
            "{} WHERE t.token_address = ?1 ORDER BY t.block_number, t.log_index",
            Self::SELECT_TRANSFER
        );
        let mut stmt = self.conn.prepare(&query)?;
        let transfers = stmt
            .query_map(params![address_key(token_address)], Self::row_to_transfer)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(transfers)
    }

    /// One page of the ledger for every token of `standard`, in
    /// `(block_number, log_index)` order.
    pub fn ledger_page(
        &self,
        standard: TokenStandard,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<TokenTransfer>> {
        let query = format!(
            "{} JOIN tokens k ON k.address = t.token_address
             WHERE k.type = ?1
             ORDER BY t.block_number, t.log_index
             LIMIT ?2 OFFSET ?3",
            Self::SELECT_TRANSFER
        );
        let mut stmt = self.conn.prepare(&query)?;
        let transfers = stmt
            .query_map(params![standard.as_str(), limit, offset], Self::row_to_transfer)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(transfers)
    }

    fn row_to_transfer(row: &Row) -> rusqlite::Result<TokenTransfer> {
        let token_id: Option<String> = row.get(6)?;
        let value = match token_id {
            Some(_) => TransferValue::TokenId(u256_column(row, 6)?),
            None => TransferValue::Amount(u256_column(row, 7)?),
        };

        Ok(TokenTransfer {
            transaction_hash: hash_column(row, 0)?,
            log_index: row.get(1)?,
            block_number: row.get(2)?,
            from: address_column(row, 3)?,
            to: address_column(row, 4)?,
            token_address: address_column(row, 5)?,
            value,
        })
    }
}
