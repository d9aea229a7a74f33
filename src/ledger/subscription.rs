use crate::events::{TokenStandard, TransferLog, decode_transfer_event};
use crate::ledger::gateway::connect_ws;
use alloy::providers::Provider;
use alloy::rpc::types::{Filter, Log};
use anyhow::Result;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

/// Opens a log stream; dropping the stream tears the connection down.
pub trait LogStreamConnector {
    fn connect(
        &self,
        filter: &Filter,
    ) -> impl Future<Output = Result<BoxStream<'static, Log>>> + Send;
}

pub struct WsLogConnector {
    url: String,
}

impl WsLogConnector {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
        }
    }
}

impl LogStreamConnector for WsLogConnector {
    async fn connect(&self, filter: &Filter) -> Result<BoxStream<'static, Log>> {
        let provider = connect_ws(&self.url).await?;
        let subscription = provider.subscribe_logs(filter).await?;
        // the stream owns the provider so the socket lives exactly as long as it
        let stream = subscription.into_stream().map(move |log| {
            let _connection = &provider;
            log
        });
        Ok(stream.boxed())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Disconnected,
    Subscribed { since: Instant },
}

/// Live transfer feed that is torn down and rebuilt on a fixed timer,
/// whether or not the current connection looks healthy.
pub struct EventSubscription<C> {
    connector: C,
    filter: Filter,
    standard: TokenStandard,
    reconnect_every: Duration,
    state: SubscriptionState,
}

impl<C: LogStreamConnector> EventSubscription<C> {
    pub fn new(
        connector: C,
        filter: Filter,
        standard: TokenStandard,
        reconnect_every: Duration,
    ) -> Self {
        Self {
            connector,
            filter,
            standard,
            reconnect_every,
            state: SubscriptionState::Disconnected,
        }
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// Forwards decoded transfers to `handler` forever.
    pub async fn run<H>(self, handler: H)
    where
        H: FnMut(TransferLog),
    {
        self.run_cycles(None, handler).await;
    }

    pub(crate) async fn run_cycles<H>(mut self, max_cycles: Option<usize>, mut handler: H) -> Self
    where
        H: FnMut(TransferLog),
    {
        let mut cycles = 0usize;
        while max_cycles.is_none_or(|max| cycles < max) {
            cycles += 1;
            let deadline = sleep(self.reconnect_every);
            tokio::pin!(deadline);

            let mut stream = match self.connector.connect(&self.filter).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("{} subscription failed to connect: {:#}", self.standard, e);
                    deadline.await;
                    continue;
                }
            };
            self.state = SubscriptionState::Subscribed {
                since: Instant::now(),
            };
            info!("{} transfer subscription established", self.standard);

            loop {
                tokio::select! {
                    _ = &mut deadline => break,
                    next = stream.next() => match next {
                        Some(log) => match decode_transfer_event(self.standard, &log) {
                            Ok(transfer) => handler(transfer),
                            Err(e) => debug!("Skipping undecodable {} log: {}", self.standard, e),
                        },
                        None => {
                            warn!(
                                "{} subscription stream ended, waiting for reconnect",
                                self.standard
                            );
                            (&mut deadline).await;
                            break;
                        }
                    },
                }
            }

            drop(stream);
            self.state = SubscriptionState::Disconnected;
            debug!("{} subscription torn down for scheduled reconnect", self.standard);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::IERC721;
    use crate::events::tests::raw_log;
    use alloy::sol_types::SolEvent;
    use alloy_primitives::{Address, B256, U256};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedConnector {
        connects: Arc<AtomicUsize>,
        fail_first: bool,
    }

    impl LogStreamConnector for ScriptedConnector {
        async fn connect(&self, _filter: &Filter) -> Result<BoxStream<'static, Log>> {
            let attempt = self.connects.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && attempt == 0 {
                anyhow::bail!("connection refused");
            }
            let mint = raw_log(
                vec![
                    IERC721::Transfer::SIGNATURE_HASH,
                    Address::ZERO.into_word(),
                    Address::repeat_byte(0x22).into_word(),
                    B256::from(U256::from(attempt)),
                ],
                vec![],
            );
            Ok(futures::stream::iter(vec![mint])
                .chain(futures::stream::pending())
                .boxed())
        }
    }

    #[tokio::test]
    async fn reconnects_on_every_timer_tick() {
        let connects = Arc::new(AtomicUsize::new(0));
        let subscription = EventSubscription::new(
            ScriptedConnector {
                connects: connects.clone(),
                fail_first: false,
            },
            Filter::new(),
            TokenStandard::Erc721,
            Duration::from_millis(20),
        );

        let mut received = Vec::new();
        let subscription = subscription
            .run_cycles(Some(3), |transfer| received.push(transfer))
            .await;

        assert_eq!(connects.load(Ordering::SeqCst), 3);
        assert_eq!(received.len(), 3);
        assert!(received.iter().all(|t| t.is_mint()));
        assert_eq!(subscription.state(), SubscriptionState::Disconnected);
    }

    #[tokio::test]
    async fn failed_connect_waits_for_the_next_tick() {
        let connects = Arc::new(AtomicUsize::new(0));
        let subscription = EventSubscription::new(
            ScriptedConnector {
                connects: connects.clone(),
                fail_first: true,
            },
            Filter::new(),
            TokenStandard::Erc721,
            Duration::from_millis(10),
        );

        let mut received = 0;
        subscription
            .run_cycles(Some(2), |_| received += 1)
            .await;

        assert_eq!(connects.load(Ordering::SeqCst), 2);
        assert_eq!(received, 1);
    }
}
