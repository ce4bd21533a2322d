use async_trait::async_trait;
use std::fmt::Debug;

use crate::config::Network;
use crate::domain::errors::IngestError;
use crate::domain::models::TxPayload;

/// What ingest did with a payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// New transaction applied; lists the ready wallets it touched
    Applied { wallets: Vec<String> },
    /// Mempool transaction got its height
    Confirmed,
    /// Nothing to do
    AlreadyProcessed,
}

/// Defines the interface the feed consumer drives
#[async_trait]
pub trait LedgerProcessor: Send + Sync + Debug {
    /// Returns the network this processor indexes
    fn network(&self) -> Network;

    /// Apply one transaction or block
    async fn process(&self, payload: &TxPayload) -> Result<IngestOutcome, IngestError>;

    /// Unlock outputs whose timelock expired by `now`; returns how many were unlocked
    async fn unlock_expired_timelocks(&self, now: i64) -> Result<usize, IngestError>;
}
