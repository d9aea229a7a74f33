use super::models::{
    HolderBalance, TokenHolder, address_column, address_key, bigint_column,
};
use crate::events::TokenStandard;
use alloy_primitives::{Address, U256};
use anyhow::Result;
use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::warn;

/// Fungible rows carry an empty token id.
const FUNGIBLE_TOKEN_ID: &str = "";

pub struct BalanceRepository<'a> {
    conn: &'a Connection,
}

impl<'a> BalanceRepository<'a> {
    const DELETE_OWNERSHIP: &'static str =
        "DELETE FROM token_balances WHERE account = ?1 AND token_address = ?2 AND token_id = ?3";

    const DELETE_TOKEN_ID: &'static str =
        "DELETE FROM token_balances WHERE token_address = ?1 AND token_id = ?2";

    const INSERT_OWNERSHIP: &'static str = "INSERT INTO token_balances (
            account, token_address, token_id, amount, last_update_block
        ) VALUES (?1, ?2, ?3, NULL, ?4)";

    const UPSERT_AMOUNT: &'static str = "INSERT INTO token_balances (
            account, token_address, token_id, amount, last_update_block
        ) VALUES (?1, ?2, '', ?3, ?4)
        ON CONFLICT (account, token_address, token_id)
        DO UPDATE SET amount = excluded.amount, last_update_block = excluded.last_update_block";

    // zero address excluded: burns park tokens there
    const COUNT_HOLDERS: &'static str = "SELECT COUNT(DISTINCT account) FROM token_balances
        WHERE token_address = ?1
          AND account <> ?2
          AND (amount IS NULL OR (amount <> '0' AND amount NOT LIKE '-%'))";

    const SELECT_UNIT_HOLDERS: &'static str = "SELECT account, COUNT(token_id) AS tokens
        FROM token_balances
        WHERE token_address = ?1 AND account <> ?2 AND token_id <> ''
        GROUP BY account
        ORDER BY tokens DESC, account ASC
        LIMIT ?3 OFFSET ?4";

    // canonical decimals without leading zeros sort by length, then lexically
    const SELECT_AMOUNT_HOLDERS: &'static str = "SELECT account, amount
        FROM token_balances
        WHERE token_address = ?1 AND account <> ?2 AND token_id = ''
          AND amount IS NOT NULL AND amount <> '0' AND amount NOT LIKE '-%'
        ORDER BY LENGTH(amount) DESC, amount DESC, account ASC
        LIMIT ?3 OFFSET ?4";

    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Moves `token_id` from `from` to `to` as delete + insert, never an update.
    /// For mints the delete finds nothing.
    ///
    /// The chain is authoritative: if the recorded owner is not `from` (history
    /// indexed from a later block), the stale row is dropped with a warning.
    pub fn transfer_ownership(
        &self,
        token_address: &Address,
        token_id: &U256,
        from: &Address,
        to: &Address,
        block_number: u64,
    ) -> Result<()> {
        let token_key = address_key(token_address);
        let id = token_id.to_string();

        match self.owner_of(token_address, token_id)? {
            Some(owner) if owner == *from => {
                self.conn.execute(
                    Self::DELETE_OWNERSHIP,
                    params![address_key(from), token_key, id],
                )?;
            }
            Some(owner) => {
                warn!(
                    "Token {:?} #{} recorded under {:?} but transferred from {:?}",
                    token_address, id, owner, from
                );
                self.conn
                    .execute(Self::DELETE_TOKEN_ID, params![token_key, id])?;
            }
            None => {}
        }
        self.conn.execute(
            Self::INSERT_OWNERSHIP,
            params![address_key(to), token_key, id, block_number],
        )?;
        Ok(())
    }

    /// Current owner of an ERC-721 token id.
    pub fn owner_of(&self, token_address: &Address, token_id: &U256) -> Result<Option<Address>> {
        let owner = self
            .conn
            .query_row(
                "SELECT account FROM token_balances WHERE token_address = ?1 AND token_id = ?2",
                params![address_key(token_address), token_id.to_string()],
                |row| address_column(row, 0),
            )
            .optional()?;
        Ok(owner)
    }

    pub fn ownership_rows(&self, token_address: &Address, token_id: &U256) -> Result<u64> {
        let rows = self.conn.query_row(
            "SELECT COUNT(*) FROM token_balances WHERE token_address = ?1 AND token_id = ?2",
            params![address_key(token_address), token_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(rows)
    }

    pub fn amount_of(&self, account: &Address, token_address: &Address) -> Result<Option<BigInt>> {
        let amount = self
            .conn
            .query_row(
                "SELECT amount FROM token_balances
                 WHERE account = ?1 AND token_address = ?2 AND token_id = ?3",
                params![address_key(account), address_key(token_address), FUNGIBLE_TOKEN_ID],
                |row| bigint_column(row, 0),
            )
            .optional()?;
        Ok(amount)
    }

    /// Adds `delta` (possibly negative) to a fungible balance. A balance that
    /// lands on exactly zero is removed; negative balances are kept as-is.
    pub fn adjust_amount(
        &self,
        account: &Address,
        token_address: &Address,
        delta: &BigInt,
        block_number: u64,
    ) -> Result<BigInt> {
        let current = self
            .amount_of(account, token_address)?
            .unwrap_or_else(BigInt::zero);
        let updated = current + delta;

        if updated.is_zero() {
            self.conn.execute(
                Self::DELETE_OWNERSHIP,
                params![address_key(account), address_key(token_address), FUNGIBLE_TOKEN_ID],
            )?;
        } else {
            if updated.is_negative() {
                warn!(
                    "Balance of {:?} for token {:?} went negative: {}",
                    account, token_address, updated
                );
            }
            self.conn.execute(
                Self::UPSERT_AMOUNT,
                params![
                    address_key(account),
                    address_key(token_address),
                    updated.to_string(),
                    block_number
                ],
            )?;
        }
        Ok(updated)
    }

    /// Distinct accounts holding a positive position, straight from the table.
    pub fn count_holders(&self, token_address: &Address) -> Result<u64> {
        let holders = self.conn.query_row(
            Self::COUNT_HOLDERS,
            params![address_key(token_address), address_key(&Address::ZERO)],
            |row| row.get(0),
        )?;
        Ok(holders)
    }

    /// Holders ordered by balance, largest first.
    pub fn get_holders(
        &self,
        token_address: &Address,
        standard: TokenStandard,
        skip: u64,
        take: u64,
    ) -> Result<Vec<TokenHolder>> {
        let token_key = address_key(token_address);
        let zero_key = address_key(&Address::ZERO);

        let holders = match standard {
            TokenStandard::Erc721 | TokenStandard::Erc1155 => {
                let mut stmt = self.conn.prepare(Self::SELECT_UNIT_HOLDERS)?;
                stmt.query_map(params![token_key, zero_key, take, skip], |row| {
                    Ok(TokenHolder {
                        account: address_column(row, 0)?,
                        balance: HolderBalance::Units(row.get(1)?),
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?
            }
            TokenStandard::Erc20 => {
                let mut stmt = self.conn.prepare(Self::SELECT_AMOUNT_HOLDERS)?;
                stmt.query_map(params![token_key, zero_key, take, skip], |row| {
                    Ok(TokenHolder {
                        account: address_column(row, 0)?,
                        balance: HolderBalance::Amount(bigint_column(row, 1)?),
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?
            }
        };

        Ok(holders)
    }
}
