use super::source::{TransferSource, decode_transfers};
use crate::events::{TokenStandard, TransferLog, TransferValue};
use crate::repository::{Database, Token, TokenRepository};
use crate::retry::RetryPolicy;
use alloy::rpc::types::Log;
use alloy_primitives::{Address, B256, U256};
use anyhow::{Result, anyhow};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-process chain: a head block plus a list of transfer logs. Raw logs go
/// through the same decoding as the RPC source.
#[derive(Clone, Default)]
pub(crate) struct MockSource {
    latest: Arc<AtomicU64>,
    logs: Arc<Mutex<Vec<TransferLog>>>,
    raw: Arc<Mutex<Vec<Log>>>,
    failing: Arc<Mutex<HashSet<Address>>>,
    pub(crate) fetches: Arc<AtomicUsize>,
}

impl MockSource {
    pub(crate) fn with_head(latest: u64) -> Self {
        let source = Self::default();
        source.set_head(latest);
        source
    }

    pub(crate) fn set_head(&self, latest: u64) {
        self.latest.store(latest, Ordering::SeqCst);
    }

    pub(crate) fn push(&self, log: TransferLog) {
        self.logs.lock().unwrap().push(log);
    }

    pub(crate) fn push_raw(&self, log: Log) {
        self.raw.lock().unwrap().push(log);
    }

    pub(crate) fn fail_for(&self, token: Address) {
        self.failing.lock().unwrap().insert(token);
    }
}

impl TransferSource for MockSource {
    async fn latest_block_number(&self) -> Result<u64> {
        Ok(self.latest.load(Ordering::SeqCst))
    }

    async fn transfer_logs(
        &self,
        standard: TokenStandard,
        token: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<TransferLog>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(&token) {
            return Err(anyhow!("connection refused"));
        }

        let mut logs: Vec<TransferLog> = self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|log| {
                log.token_address == token
                    && log.block_number >= from_block
                    && log.block_number <= to_block
            })
            .cloned()
            .collect();

        let raw: Vec<Log> = self
            .raw
            .lock()
            .unwrap()
            .iter()
            .filter(|log| {
                log.address() == token
                    && log
                        .block_number
                        .is_some_and(|block| block >= from_block && block <= to_block)
            })
            .cloned()
            .collect();
        logs.extend(decode_transfers(standard, token, &raw)?);

        logs.sort_by_key(|log| (log.block_number, log.log_index));
        Ok(logs)
    }
}

pub(crate) fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        base_delay_ms: 1,
        max_delay: Duration::from_millis(2),
    }
}

pub(crate) fn account(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

pub(crate) fn seed_token(
    db: &Database,
    address: Address,
    token_type: &str,
    synced_till_block: u64,
) {
    db.with_conn(|conn| {
        TokenRepository::new(conn).insert(&Token {
            address,
            name: "Test Token".to_string(),
            symbol: "TST".to_string(),
            token_type: token_type.to_string(),
            total_supply: "0".to_string(),
            total_holders: 0,
            synced_till_block,
        })
    })
    .unwrap();
}

pub(crate) fn token_row(db: &Database, address: Address) -> Token {
    db.with_conn(|conn| TokenRepository::new(conn).get(&address))
        .unwrap()
        .unwrap()
}

pub(crate) fn nft_transfer(
    token: Address,
    block_number: u64,
    log_index: u64,
    from: Address,
    to: Address,
    token_id: u64,
) -> TransferLog {
    TransferLog {
        transaction_hash: B256::with_last_byte(block_number as u8),
        log_index,
        block_number,
        token_address: token,
        from,
        to,
        value: TransferValue::TokenId(U256::from(token_id)),
    }
}

pub(crate) fn fungible_transfer(
    token: Address,
    block_number: u64,
    log_index: u64,
    from: Address,
    to: Address,
    amount: u64,
) -> TransferLog {
    TransferLog {
        value: TransferValue::Amount(U256::from(amount)),
        ..nft_transfer(token, block_number, log_index, from, to, 0)
    }
}
