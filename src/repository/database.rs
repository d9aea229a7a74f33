use anyhow::{Context, Result};
use rusqlite::{Connection, Transaction};
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared handle to the primary store.
///
/// SQLite work is blocking; async callers go through [`Database::run`] and
/// [`Database::run_in_transaction`], which hop onto the blocking pool.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(db_path: &str) -> Result<Self> {
        let db_path = db_path.strip_prefix("sqlite:").unwrap_or(db_path);
        let conn = Connection::open(db_path).context("Failed to open database")?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.with_conn(create_tables)?;
        Ok(db)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Database connection lock poisoned"))
    }

    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Commits when `f` succeeds; any error rolls the whole block back.
    pub fn with_transaction<T>(&self, f: impl FnOnce(&Transaction) -> Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    pub async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.with_conn(f)).await?
    }

    pub async fn run_in_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.with_transaction(f)).await?
    }
}

pub(crate) fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS tokens (
            address TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            symbol TEXT NOT NULL,
            type TEXT NOT NULL,
            total_supply TEXT NOT NULL DEFAULT '0',
            total_holders INTEGER NOT NULL DEFAULT 0,
            synced_till_block INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    // exactly one of token_id / amount is set, depending on the standard
    conn.execute(
        "CREATE TABLE IF NOT EXISTS token_transfers (
            tx_hash TEXT NOT NULL,
            log_index INTEGER NOT NULL,
            block_number INTEGER NOT NULL,
            from_address TEXT NOT NULL,
            to_address TEXT NOT NULL,
            token_address TEXT NOT NULL,
            token_id TEXT,
            amount TEXT,
            PRIMARY KEY (tx_hash, log_index),
            CHECK ((token_id IS NULL) <> (amount IS NULL))
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_token_transfers_token
         ON token_transfers(token_address)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_token_transfers_ledger_order
         ON token_transfers(block_number, log_index)",
        [],
    )?;

    // ERC-20 rows use an empty token_id
    conn.execute(
        "CREATE TABLE IF NOT EXISTS token_balances (
            account TEXT NOT NULL,
            token_address TEXT NOT NULL,
            token_id TEXT NOT NULL DEFAULT '',
            amount TEXT,
            last_update_block INTEGER NOT NULL,
            PRIMARY KEY (account, token_address, token_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_token_balances_single_owner
         ON token_balances(token_address, token_id) WHERE token_id <> ''",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_token_balances_token
         ON token_balances(token_address)",
        [],
    )?;

    Ok(())
}
