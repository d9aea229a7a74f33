use super::scanner_db::{ScannerDatabase, ScannerLedger};
use crate::error::IndexerError;
use crate::events::{TokenStandard, TransferValue};
use crate::repository::models::u256_to_bigint;
use crate::repository::{Database, TokenTransfer, TransferRepository};
use alloy_primitives::Address;
use anyhow::{Context, Result};
use num_bigint::BigInt;
use num_traits::One;
use rusqlite::Connection;
use tracing::{debug, info};

pub const DEFAULT_BATCH_SIZE: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportReport {
    pub exported: u64,
    /// Where a later run should resume.
    pub next_offset: u64,
}

/// Replays the transfer ledger of one standard into the scanner schema.
///
/// Not idempotent: a run must resume from the offset the previous run
/// reported, never from an earlier one.
pub struct ScannerExporter<'a> {
    ledger: &'a Database,
    scanner: &'a mut ScannerDatabase,
    standard: TokenStandard,
    batch_size: u64,
}

impl<'a> ScannerExporter<'a> {
    pub fn new(
        ledger: &'a Database,
        scanner: &'a mut ScannerDatabase,
        standard: TokenStandard,
    ) -> Self {
        Self {
            ledger,
            scanner,
            standard,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn run(&mut self, offset: u64) -> Result<ExportReport> {
        let standard = self.standard;
        let mut next_offset = offset;
        let mut exported = 0;

        info!("Exporting {} transfers from offset {}", standard, offset);

        loop {
            let batch_size = self.batch_size;
            let page = self.ledger.with_conn(|conn| {
                TransferRepository::new(conn).ledger_page(standard, next_offset, batch_size)
            })?;

            for transfer in &page {
                self.scanner
                    .with_transaction(|tx| apply_transfer(tx, standard, transfer))
                    .with_context(|| {
                        format!(
                            "Export stopped at offset {next_offset} (tx {:?}, log {})",
                            transfer.transaction_hash, transfer.log_index
                        )
                    })?;
                next_offset += 1;
                exported += 1;
            }

            debug!("Exported {} transfers, next offset {}", exported, next_offset);
            if (page.len() as u64) < batch_size {
                break;
            }
        }

        info!(
            "Exported {} {} transfers, next offset {}",
            exported, standard, next_offset
        );
        Ok(ExportReport {
            exported,
            next_offset,
        })
    }
}

fn apply_transfer(
    conn: &Connection,
    standard: TokenStandard,
    transfer: &TokenTransfer,
) -> Result<()> {
    let delta = match &transfer.value {
        TransferValue::TokenId(_) => BigInt::one(),
        TransferValue::Amount(amount) => u256_to_bigint(amount),
    };
    let ledger = ScannerLedger::new(conn);

    if !transfer.is_mint() {
        let current = ledger.current(&transfer.from, &transfer.token_address)?;
        if current.is_none() {
            return Err(IndexerError::ConsistencyViolation(format!(
                "{:?} sends {} of token {:?} at block {} without a tracked balance",
                transfer.from, delta, transfer.token_address, transfer.block_number
            ))
            .into());
        }
        adjust(&ledger, standard, transfer, &transfer.from, &-delta.clone())?;
    }
    adjust(&ledger, standard, transfer, &transfer.to, &delta)
}

fn adjust(
    ledger: &ScannerLedger,
    standard: TokenStandard,
    transfer: &TokenTransfer,
    account: &Address,
    delta: &BigInt,
) -> Result<()> {
    let token = &transfer.token_address;
    let block_number = transfer.block_number;
    let token_type = standard.as_str();

    // same-block transfers fold into one snapshot row
    match ledger.snapshot_at(account, token, block_number)? {
        Some(snapshot) => ledger.update_snapshot(snapshot.id, &(snapshot.value + delta))?,
        None => {
            let base = ledger
                .snapshot_before(account, token, block_number)?
                .map(|snapshot| snapshot.value)
                .unwrap_or_default();
            ledger.insert_snapshot(account, token, block_number, &(base + delta), token_type)?;
        }
    }

    match ledger.current(account, token)? {
        Some(current) => {
            let value = &current.value + delta;
            ledger.update_current(account, token, block_number, &value, &current.value)?;
        }
        None => ledger.insert_current(account, token, block_number, delta, token_type)?,
    }
    Ok(())
}
