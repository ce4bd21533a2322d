//! Wallet loading and reads.

pub mod loader;
pub mod query;

pub use loader::{wallet_id_for, WalletLoader};
pub use query::{WalletQueryService, MAX_HISTORY_PAGE};
