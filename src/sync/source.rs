use crate::events::{TokenStandard, TransferLog, decode_transfer_event};
use crate::rpc::RpcClient;
use alloy::rpc::types::Log;
use alloy_primitives::Address;
use anyhow::{Context, Result};
use std::future::Future;
use tracing::debug;

/// Where the sync engine reads chain state from.
pub trait TransferSource {
    fn latest_block_number(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Decoded transfer events of `token` in `[from_block, to_block]`, in log order.
    fn transfer_logs(
        &self,
        standard: TokenStandard,
        token: Address,
        from_block: u64,
        to_block: u64,
    ) -> impl Future<Output = Result<Vec<TransferLog>>> + Send;
}

impl TransferSource for RpcClient {
    async fn latest_block_number(&self) -> Result<u64> {
        self.get_latest_block().await
    }

    async fn transfer_logs(
        &self,
        standard: TokenStandard,
        token: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<TransferLog>> {
        let logs = self
            .get_logs(from_block, to_block, token, standard.transfer_topic())
            .await?;
        debug!(
            "Fetched {} {} logs for {:?} in blocks {}-{}",
            logs.len(),
            standard,
            token,
            from_block,
            to_block
        );
        decode_transfers(standard, token, &logs)
    }
}

/// Decodes a fetched window in log order. One undecodable log fails the whole
/// window, so the cursor never moves past it.
pub(crate) fn decode_transfers(
    standard: TokenStandard,
    token: Address,
    logs: &[Log],
) -> Result<Vec<TransferLog>> {
    let mut transfers = logs
        .iter()
        .map(|log| {
            decode_transfer_event(standard, log).with_context(|| {
                format!(
                    "Undecodable {} transfer of {:?} (tx {:?}, log {:?})",
                    standard, token, log.transaction_hash, log.log_index
                )
            })
        })
        .collect::<Result<Vec<_>>>()?;
    transfers.sort_by_key(|t| (t.block_number, t.log_index));
    Ok(transfers)
}
