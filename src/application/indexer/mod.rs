//! Ledger Indexer Module
//!
//! Applies full-node transactions to the UTXO store and the address/wallet
//! projections, and rolls them back on reorgs.

pub mod feed;
pub mod processor_trait;
pub mod projector;
pub mod reorg;
pub mod tx_processor;

pub use feed::{FeedError, FeedStats, LedgerFeed};
pub use processor_trait::{IngestOutcome, LedgerProcessor};
pub use projector::{GapOutcome, Projector};
pub use reorg::{ReorgOutcome, ReorgResolver};
pub use tx_processor::TxProcessor;
