//! Feed consumer.
//!
//! Drains the channel of transactions coming from the full node, hands each
//! one to the ingest pipeline and resolves reorgs when a block conflicts with
//! the stored chain. A periodic sweep unlocks expired timelocks and expires
//! stale proposals.

use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

use crate::application::indexer::processor_trait::{IngestOutcome, LedgerProcessor};
use crate::application::indexer::reorg::ReorgResolver;
use crate::application::proposal::ProposalBuilder;
use crate::config::FeedConfig;
use crate::domain::errors::{IngestError, ReorgError};
use crate::domain::models::TxPayload;
use crate::infrastructure::peer::ChainPeer;
use crate::utils::logging;

#[derive(Debug)]
pub enum FeedError {
    Ingest(IngestError),
    Reorg(ReorgError),
    /// Reorg resolution voided nothing, so the conflicting block cannot apply
    UnresolvedReorg { tx_id: String, height: i32 },
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedError::Ingest(e) => write!(f, "Ingest error: {}", e),
            FeedError::Reorg(e) => write!(f, "Reorg error: {}", e),
            FeedError::UnresolvedReorg { tx_id, height } => write!(
                f,
                "Block {} at height {} still conflicts after reorg resolution",
                tx_id, height
            ),
        }
    }
}

impl std::error::Error for FeedError {}

impl From<IngestError> for FeedError {
    fn from(error: IngestError) -> Self {
        FeedError::Ingest(error)
    }
}

impl From<ReorgError> for FeedError {
    fn from(error: ReorgError) -> Self {
        FeedError::Reorg(error)
    }
}

/// Counters logged by the feed loop
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FeedStats {
    pub applied: u64,
    pub confirmed: u64,
    pub duplicates: u64,
    pub rejected: u64,
    pub reorgs: u64,
    pub errors: u64,
}

impl FeedStats {
    fn record(&mut self, result: &Result<IngestOutcome, FeedError>) {
        match result {
            Ok(IngestOutcome::Applied { .. }) => self.applied += 1,
            Ok(IngestOutcome::Confirmed) => self.confirmed += 1,
            Ok(IngestOutcome::AlreadyProcessed) => self.duplicates += 1,
            Err(FeedError::Ingest(IngestError::Rejected(_))) => self.rejected += 1,
            Err(_) => self.errors += 1,
        }
    }
}

/// Drives the ingest pipeline from a stream of payloads
pub struct LedgerFeed<P> {
    processor: Arc<dyn LedgerProcessor>,
    resolver: Arc<ReorgResolver<P>>,
    proposals: Option<Arc<ProposalBuilder>>,
    config: FeedConfig,
    stats: FeedStats,
}

impl<P: ChainPeer> LedgerFeed<P> {
    pub fn new(
        processor: Arc<dyn LedgerProcessor>,
        resolver: Arc<ReorgResolver<P>>,
        proposals: Option<Arc<ProposalBuilder>>,
        config: FeedConfig,
    ) -> Self {
        Self {
            processor,
            resolver,
            proposals,
            config,
            stats: FeedStats::default(),
        }
    }

    pub fn stats(&self) -> FeedStats {
        self.stats
    }

    /// Consume payloads until the channel closes
    pub async fn run(mut self, mut receiver: mpsc::Receiver<TxPayload>) -> FeedStats {
        let network = self.processor.network();
        let mut sweep_timer = interval(Duration::from_millis(self.config.sweep_interval_ms.max(1)));
        sweep_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        logging::log_info(&format!(
            "[{}] 🚀 Starting ledger feed (sweep every {} ms)",
            network, self.config.sweep_interval_ms
        ));

        loop {
            tokio::select! {
                payload = receiver.recv() => {
                    match payload {
                        Some(payload) => {
                            if let Err(e) = self.handle(&payload).await {
                                match &e {
                                    FeedError::Ingest(IngestError::Rejected(_)) => logging::log_warning(
                                        &format!("[{}] ⚠️ Skipping tx {}: {}", network, payload.tx_id, e),
                                    ),
                                    _ => logging::log_error(&format!(
                                        "[{}] ❌ Dropping tx {}: {}",
                                        network, payload.tx_id, e
                                    )),
                                }
                            }
                        }
                        None => {
                            logging::log_info(&format!("[{}] 🛑 Feed closed, shutting down", network));
                            break;
                        }
                    }
                }

                _ = sweep_timer.tick() => {
                    self.sweep(Utc::now().timestamp()).await;
                }
            }
        }

        logging::log_info(&format!(
            "[{}] 📊 Feed stats - applied: {}, confirmed: {}, duplicates: {}, rejected: {}, reorgs: {}, errors: {}",
            network,
            self.stats.applied,
            self.stats.confirmed,
            self.stats.duplicates,
            self.stats.rejected,
            self.stats.reorgs,
            self.stats.errors
        ));
        self.stats
    }

    /// Process one payload; a conflicting block triggers reorg resolution and one retry
    pub async fn handle(&mut self, payload: &TxPayload) -> Result<IngestOutcome, FeedError> {
        let result = self.handle_inner(payload).await;
        self.stats.record(&result);
        result
    }

    async fn handle_inner(&mut self, payload: &TxPayload) -> Result<IngestOutcome, FeedError> {
        match self.processor.process(payload).await {
            Err(IngestError::ReorgDetected { height, stored_block }) => {
                logging::log_warning(&format!(
                    "[{}] 🔀 Block {} conflicts with stored block {} at height {}",
                    self.processor.network(),
                    payload.tx_id,
                    stored_block,
                    height
                ));
                self.stats.reorgs += 1;

                let outcome = self.resolver.resolve().await?;
                if outcome.voided.is_empty() {
                    return Err(FeedError::UnresolvedReorg {
                        tx_id: payload.tx_id.clone(),
                        height,
                    });
                }
                Ok(self.processor.process(payload).await?)
            }
            other => Ok(other?),
        }
    }

    /// Unlock expired timelocks and expire stale proposals at `now`
    pub async fn sweep(&self, now: i64) {
        let network = self.processor.network();

        match self.processor.unlock_expired_timelocks(now).await {
            Ok(0) => {}
            Ok(count) => logging::log_info(&format!(
                "[{}] 🔓 Unlocked {} timelocked outputs",
                network, count
            )),
            Err(e) => logging::log_error(&format!(
                "[{}] ❌ Timelock sweep failed: {}",
                network, e
            )),
        }

        if let Some(proposals) = &self.proposals {
            match proposals.expire_stale(now).await {
                Ok(expired) if expired.is_empty() => {}
                Ok(expired) => logging::log_info(&format!(
                    "[{}] ⌛ Expired {} proposals",
                    network,
                    expired.len()
                )),
                Err(e) => logging::log_error(&format!(
                    "[{}] ❌ Proposal expiry failed: {}",
                    network, e
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_count_rejections_apart_from_errors() {
        let mut stats = FeedStats::default();
        stats.record(&Ok(IngestOutcome::Applied { wallets: vec![] }));
        stats.record(&Ok(IngestOutcome::AlreadyProcessed));
        stats.record(&Err(FeedError::Ingest(IngestError::Rejected("tx".into()))));
        stats.record(&Err(FeedError::UnresolvedReorg {
            tx_id: "b".into(),
            height: 3,
        }));
        assert_eq!(stats.applied, 1);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.errors, 1);
    }
}
