use crate::repository::models::{address_key, bigint_column};
use alloy_primitives::Address;
use anyhow::{Context, Result};
use num_bigint::BigInt;
use rusqlite::{Connection, OptionalExtension, Transaction, params};

/// The analytics store written by the exporter. Raw statements only; nothing
/// here is read back into the primary model.
pub struct ScannerDatabase {
    conn: Connection,
}

impl ScannerDatabase {
    pub fn new(db_path: &str) -> Result<Self> {
        let db_path = db_path.strip_prefix("sqlite:").unwrap_or(db_path);
        let conn = Connection::open(db_path).context("Failed to open scanner database")?;
        create_tables(&conn)?;
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        create_tables(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn with_transaction<T>(
        &mut self,
        f: impl FnOnce(&Transaction) -> Result<T>,
    ) -> Result<T> {
        let tx = self.conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS address_token_balances (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            address_hash TEXT NOT NULL,
            token_contract_address_hash TEXT NOT NULL,
            block_number INTEGER NOT NULL,
            value TEXT,
            value_fetched_at TEXT,
            token_type TEXT NOT NULL,
            inserted_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_address_token_balances_lookup
         ON address_token_balances(address_hash, token_contract_address_hash, block_number)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS address_current_token_balances (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            address_hash TEXT NOT NULL,
            token_contract_address_hash TEXT NOT NULL,
            block_number INTEGER NOT NULL,
            value TEXT,
            old_value TEXT,
            value_fetched_at TEXT,
            token_type TEXT NOT NULL,
            inserted_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (address_hash, token_contract_address_hash)
        )",
        [],
    )?;

    Ok(())
}

/// One historical row of `address_token_balances`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub id: i64,
    pub block_number: u64,
    pub value: BigInt,
}

/// One row of `address_current_token_balances`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentBalance {
    pub block_number: u64,
    pub value: BigInt,
    pub old_value: Option<BigInt>,
}

/// Statement helpers over an open scanner connection or transaction.
pub struct ScannerLedger<'a> {
    conn: &'a Connection,
}

impl<'a> ScannerLedger<'a> {
    const SELECT_SNAPSHOT: &'static str = "SELECT id, block_number, COALESCE(value, '0')
        FROM address_token_balances
        WHERE address_hash = ?1 AND token_contract_address_hash = ?2";

    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn snapshot_at(
        &self,
        account: &Address,
        token: &Address,
        block_number: u64,
    ) -> Result<Option<Snapshot>> {
        let query = format!(
            "{} AND block_number = ?3 ORDER BY id DESC LIMIT 1",
            Self::SELECT_SNAPSHOT
        );
        let snapshot = self
            .conn
            .query_row(
                &query,
                params![address_key(account), address_key(token), block_number],
                Self::row_to_snapshot,
            )
            .optional()?;
        Ok(snapshot)
    }

    /// Latest snapshot strictly before `block_number`.
    pub fn snapshot_before(
        &self,
        account: &Address,
        token: &Address,
        block_number: u64,
    ) -> Result<Option<Snapshot>> {
        let query = format!(
            "{} AND block_number < ?3 ORDER BY block_number DESC, id DESC LIMIT 1",
            Self::SELECT_SNAPSHOT
        );
        let snapshot = self
            .conn
            .query_row(
                &query,
                params![address_key(account), address_key(token), block_number],
                Self::row_to_snapshot,
            )
            .optional()?;
        Ok(snapshot)
    }

    pub fn snapshots(&self, account: &Address, token: &Address) -> Result<Vec<Snapshot>> {
        let query = format!("{} ORDER BY block_number, id", Self::SELECT_SNAPSHOT);
        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt
            .query_map(
                params![address_key(account), address_key(token)],
                Self::row_to_snapshot,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn insert_snapshot(
        &self,
        account: &Address,
        token: &Address,
        block_number: u64,
        value: &BigInt,
        token_type: &str,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO address_token_balances (
                address_hash, token_contract_address_hash, block_number, value,
                value_fetched_at, token_type
            ) VALUES (?1, ?2, ?3, ?4, CURRENT_TIMESTAMP, ?5)",
            params![
                address_key(account),
                address_key(token),
                block_number,
                value.to_string(),
                token_type
            ],
        )?;
        Ok(())
    }

    pub fn update_snapshot(&self, id: i64, value: &BigInt) -> Result<()> {
        self.conn.execute(
            "UPDATE address_token_balances
             SET value = ?1, value_fetched_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
             WHERE id = ?2",
            params![value.to_string(), id],
        )?;
        Ok(())
    }

    pub fn current(&self, account: &Address, token: &Address) -> Result<Option<CurrentBalance>> {
        let current = self
            .conn
            .query_row(
                "SELECT block_number, COALESCE(value, '0'), old_value
                 FROM address_current_token_balances
                 WHERE address_hash = ?1 AND token_contract_address_hash = ?2",
                params![address_key(account), address_key(token)],
                |row| {
                    let old_value: Option<String> = row.get(2)?;
                    Ok(CurrentBalance {
                        block_number: row.get(0)?,
                        value: bigint_column(row, 1)?,
                        old_value: match old_value {
                            Some(_) => Some(bigint_column(row, 2)?),
                            None => None,
                        },
                    })
                },
            )
            .optional()?;
        Ok(current)
    }

    pub fn insert_current(
        &self,
        account: &Address,
        token: &Address,
        block_number: u64,
        value: &BigInt,
        token_type: &str,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO address_current_token_balances (
                address_hash, token_contract_address_hash, block_number, value,
                value_fetched_at, token_type
            ) VALUES (?1, ?2, ?3, ?4, CURRENT_TIMESTAMP, ?5)",
            params![
                address_key(account),
                address_key(token),
                block_number,
                value.to_string(),
                token_type
            ],
        )?;
        Ok(())
    }

    /// Overwrites `value`, keeping the previous one in `old_value`.
    pub fn update_current(
        &self,
        account: &Address,
        token: &Address,
        block_number: u64,
        value: &BigInt,
        old_value: &BigInt,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE address_current_token_balances
             SET value = ?1, old_value = ?2, block_number = ?3,
                 value_fetched_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
             WHERE address_hash = ?4 AND token_contract_address_hash = ?5",
            params![
                value.to_string(),
                old_value.to_string(),
                block_number,
                address_key(account),
                address_key(token)
            ],
        )?;
        Ok(())
    }

    fn row_to_snapshot(row: &rusqlite::Row) -> rusqlite::Result<Snapshot> {
        Ok(Snapshot {
            id: row.get(0)?,
            block_number: row.get(1)?,
            value: bigint_column(row, 2)?,
        })
    }
}
