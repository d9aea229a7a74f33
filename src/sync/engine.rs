use super::source::TransferSource;
use crate::events::{TokenStandard, TransferLog, TransferValue};
use crate::repository::models::u256_to_bigint;
use crate::repository::{BalanceRepository, Database, TokenRepository, TransferRepository};
use crate::retry::{RetryPolicy, retryable};
use alloy_primitives::Address;
use anyhow::{Result, bail};
use rusqlite::Connection;
use tracing::{debug, info};

pub const DEFAULT_WINDOW_BLOCKS: u64 = 100_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    UnknownToken,
    UnsupportedType(String),
    /// The stored cursor is past the scan target; scanning backward is never done.
    CursorAhead { cursor: u64, target: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Skipped(SkipReason),
    Synced {
        from_block: u64,
        to_block: u64,
        applied: usize,
        already_applied: usize,
    },
}

/// Incremental, restartable ingestion of one token's transfer history.
///
/// Every log is applied in its own transaction and is keyed by
/// `(tx_hash, log_index)`, so any prefix of a pass can be replayed safely.
pub struct TokenSyncEngine<S> {
    db: Database,
    source: S,
    retry: RetryPolicy,
    window_blocks: u64,
}

impl<S: TransferSource + Send + Sync + 'static> TokenSyncEngine<S> {
    pub fn new(db: Database, source: S, retry: RetryPolicy) -> Self {
        Self {
            db,
            source,
            retry,
            window_blocks: DEFAULT_WINDOW_BLOCKS,
        }
    }

    pub fn with_window(mut self, window_blocks: u64) -> Self {
        self.window_blocks = window_blocks;
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn sync_token(&self, address: Address) -> Result<SyncOutcome> {
        let Some(token) = self
            .db
            .run(move |conn| TokenRepository::new(conn).get(&address))
            .await?
        else {
            debug!("Token {:?} is not registered, skipping", address);
            return Ok(SyncOutcome::Skipped(SkipReason::UnknownToken));
        };

        let standard = match token.standard() {
            Some(standard @ (TokenStandard::Erc20 | TokenStandard::Erc721)) => standard,
            _ => {
                debug!("Token {:?} has type {}, skipping", address, token.token_type);
                return Ok(SyncOutcome::Skipped(SkipReason::UnsupportedType(
                    token.token_type,
                )));
            }
        };

        let latest_block = retryable(&self.retry, "latest block", || {
            self.source.latest_block_number()
        })
        .await?;

        let cursor = token.synced_till_block;
        let sync_till = latest_block.min(cursor.saturating_add(self.window_blocks));
        if cursor > sync_till {
            debug!(
                "Token {:?} cursor {} is ahead of block {}, skipping",
                address, cursor, sync_till
            );
            return Ok(SyncOutcome::Skipped(SkipReason::CursorAhead {
                cursor,
                target: sync_till,
            }));
        }

        let label = format!("{standard} logs for {address:?}");
        let logs = retryable(&self.retry, &label, || {
            self.source.transfer_logs(standard, address, cursor, sync_till)
        })
        .await?;

        let mut applied = 0;
        let mut already_applied = 0;
        for log in &logs {
            let label = format!("apply {:?}:{}", log.transaction_hash, log.log_index);
            let inserted = retryable(&self.retry, &label, || {
                let log = log.clone();
                self.db
                    .run_in_transaction(move |tx| apply_transfer(tx, standard, &log))
            })
            .await?;

            if inserted {
                applied += 1;
            } else {
                already_applied += 1;
            }
        }

        // advances the cursor even when the window held no logs
        self.db
            .run(move |conn| {
                TokenRepository::new(conn).update_synced_till_block(&address, sync_till)
            })
            .await?;

        if applied > 0 {
            info!(
                "Token {:?}: applied {} transfers in blocks {}-{}",
                address, applied, cursor, sync_till
            );
        }

        Ok(SyncOutcome::Synced {
            from_block: cursor,
            to_block: sync_till,
            applied,
            already_applied,
        })
    }
}

/// Applies one log; `Ok(false)` means it was already recorded.
pub(crate) fn apply_transfer(
    conn: &Connection,
    standard: TokenStandard,
    log: &TransferLog,
) -> Result<bool> {
    let transfers = TransferRepository::new(conn);
    if transfers.exists(&log.transaction_hash, log.log_index)? {
        return Ok(false);
    }
    transfers.insert(log)?;

    let balances = BalanceRepository::new(conn);
    match (standard, &log.value) {
        (TokenStandard::Erc721, TransferValue::TokenId(token_id)) => {
            balances.transfer_ownership(
                &log.token_address,
                token_id,
                &log.from,
                &log.to,
                log.block_number,
            )?;
        }
        (TokenStandard::Erc20, TransferValue::Amount(amount)) => {
            let amount = u256_to_bigint(amount);
            if !log.is_mint() {
                balances.adjust_amount(
                    &log.from,
                    &log.token_address,
                    &-amount.clone(),
                    log.block_number,
                )?;
            }
            balances.adjust_amount(&log.to, &log.token_address, &amount, log.block_number)?;
        }
        (standard, value) => bail!("{standard} token cannot apply transfer value {value:?}"),
    }

    let tokens = TokenRepository::new(conn);
    let holders = balances.count_holders(&log.token_address)?;
    tokens.update_after_transfer(&log.token_address, holders, log.block_number)?;

    if standard == TokenStandard::Erc721 && log.is_mint() {
        tokens.increment_total_supply(&log.token_address)?;
    }

    Ok(true)
}
