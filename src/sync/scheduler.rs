use super::engine::{SyncOutcome, TokenSyncEngine};
use super::source::TransferSource;
use crate::config::SyncSettings;
use crate::repository::TokenRepository;
use futures::future::join_all;
use std::time::Duration;
use tokio::time::sleep;
use tokio_retry::strategy::jitter;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub synced: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Drives the sync engine over every registered token, one pass at a time.
pub struct SyncScheduler<S> {
    engine: TokenSyncEngine<S>,
    interval: Duration,
    jitter: Duration,
}

impl<S: TransferSource + Send + Sync + 'static> SyncScheduler<S> {
    pub fn new(engine: TokenSyncEngine<S>, settings: &SyncSettings) -> Self {
        Self {
            engine,
            interval: settings.interval,
            jitter: settings.jitter,
        }
    }

    pub fn engine(&self) -> &TokenSyncEngine<S> {
        &self.engine
    }

    /// Syncs all tokens concurrently. Never fails: per-token errors are logged
    /// and counted.
    pub async fn run_pass(&self) -> PassReport {
        let addresses = match self
            .engine
            .database()
            .run(|conn| TokenRepository::new(conn).all_addresses())
            .await
        {
            Ok(addresses) => addresses,
            Err(e) => {
                error!("Failed to load tokens: {:#}", e);
                return PassReport {
                    failed: 1,
                    ..PassReport::default()
                };
            }
        };

        let results = join_all(addresses.iter().map(|address| async move {
            (address, self.engine.sync_token(*address).await)
        }))
        .await;

        let mut report = PassReport::default();
        for (address, result) in results {
            match result {
                Ok(SyncOutcome::Synced { .. }) => report.synced += 1,
                Ok(SyncOutcome::Skipped(_)) => report.skipped += 1,
                Err(e) => {
                    error!("Sync failed for token {:?}: {:#}", address, e);
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Runs passes forever; the next one starts only after the previous settled.
    pub async fn run(&self) {
        info!(
            "Starting sync loop every {:?} (jitter up to {:?})",
            self.interval, self.jitter
        );
        loop {
            let report = self.run_pass().await;
            info!(
                "Sync pass finished: {} synced, {} skipped, {} failed",
                report.synced, report.skipped, report.failed
            );
            sleep(self.next_delay()).await;
        }
    }

    fn next_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            self.interval
        } else {
            self.interval + jitter(self.jitter)
        }
    }
}
