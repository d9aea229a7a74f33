use alloy::rpc::types::TransactionReceipt;
use anyhow::Result;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

type Executor<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

struct PendingTransaction<T> {
    executor: Executor<T>,
    reply: oneshot::Sender<Result<T>>,
}

/// FIFO serializer for chain-mutating calls.
///
/// One executor runs at a time across every clone of the handle, so flows that
/// sign with the same key never race on nonces. Create one per process and pass
/// it to whoever needs to send transactions.
pub struct TransactionPipeline<T = TransactionReceipt> {
    sender: mpsc::UnboundedSender<PendingTransaction<T>>,
}

impl<T> Clone for TransactionPipeline<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T: Send + 'static> TransactionPipeline<T> {
    /// Spawns the worker on the current tokio runtime.
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_pipeline(receiver));
        Self { sender }
    }

    /// Queues `executor` behind every earlier submission and waits for its own result.
    pub async fn submit<F>(&self, executor: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(PendingTransaction {
                executor: Box::pin(executor),
                reply,
            })
            .map_err(|_| anyhow::anyhow!("Transaction pipeline is closed"))?;

        response
            .await
            .map_err(|_| anyhow::anyhow!("Transaction pipeline dropped the request"))?
    }
}

impl<T: Send + 'static> Default for TransactionPipeline<T> {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_pipeline<T>(mut receiver: mpsc::UnboundedReceiver<PendingTransaction<T>>) {
    while let Some(pending) = receiver.recv().await {
        let result = match AssertUnwindSafe(pending.executor).catch_unwind().await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("Transaction executor panicked")),
        };

        if let Err(e) = &result {
            warn!("Queued transaction failed: {:#}", e);
        }

        // the caller may have stopped waiting
        let _ = pending.reply.send(result);
    }
    debug!("Transaction pipeline closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[tokio::test]
    async fn runs_one_executor_at_a_time_in_fifo_order() {
        let pipeline: TransactionPipeline<usize> = TransactionPipeline::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));

        let submissions = (0..5).map(|id| {
            let pipeline = pipeline.clone();
            let in_flight = in_flight.clone();
            let max_in_flight = max_in_flight.clone();
            let order = order.clone();
            async move {
                pipeline
                    .submit(async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        max_in_flight.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        order.lock().unwrap().push(id);
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok(id * 10)
                    })
                    .await
            }
        });

        let results = futures::future::join_all(submissions).await;

        let values: Vec<usize> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![0, 10, 20, 30, 40]);
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn failures_reach_only_their_own_caller() {
        let pipeline: TransactionPipeline<u32> = TransactionPipeline::new();

        let failed = pipeline
            .submit(async { Err(anyhow::anyhow!("nonce too low")) })
            .await;
        let ok = pipeline.submit(async { Ok(7) }).await;

        assert!(failed.unwrap_err().to_string().contains("nonce too low"));
        assert_eq!(ok.unwrap(), 7);
    }

    #[tokio::test]
    async fn survives_a_panicking_executor() {
        let pipeline: TransactionPipeline<u32> = TransactionPipeline::new();

        let panicked = pipeline
            .submit(async {
                let receipt: Option<u32> = None;
                Ok(receipt.expect("boom"))
            })
            .await;
        assert!(panicked.is_err());

        assert_eq!(pipeline.submit(async { Ok(1) }).await.unwrap(), 1);
    }
}
