//! Wallet loading.
//!
//! A wallet starts CREATING, gets its first `max_gap` addresses (claiming any
//! the ledger already knows), has its balances and history seeded from the
//! address tables and then turns READY. From that point ingest keeps it up to date.

use bitcoin::hashes::{sha256, Hash};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::application::indexer::Projector;
use crate::config::LedgerConfig;
use crate::domain::errors::WalletError;
use crate::domain::models::{Wallet, WalletStatus};
use crate::domain::services::AddressDeriver;
use crate::infrastructure::persistence::{DbPool, RepositoryFactory};
use crate::utils::logging;

/// Wallet id for an extended public key
pub fn wallet_id_for(xpubkey: &str) -> String {
    sha256::Hash::hash(xpubkey.as_bytes()).to_string()
}

pub struct WalletLoader {
    pool: DbPool,
    deriver: Arc<dyn AddressDeriver>,
    projector: Projector,
    config: LedgerConfig,
    gate: Arc<RwLock<()>>,
}

impl WalletLoader {
    pub fn new(
        pool: DbPool,
        deriver: Arc<dyn AddressDeriver>,
        config: LedgerConfig,
        gate: Arc<RwLock<()>>,
    ) -> Self {
        Self {
            pool,
            projector: Projector::new(deriver.clone()),
            deriver,
            config,
            gate,
        }
    }

    /// Load a wallet from its xpub. A wallet already CREATING or READY is
    /// returned as stored; one left in ERROR is loaded again.
    pub async fn load(&self, xpubkey: &str, max_gap: Option<i32>) -> Result<Wallet, WalletError> {
        let max_gap = max_gap.unwrap_or(self.config.default_max_gap);
        if max_gap <= 0 {
            return Err(WalletError::InvalidParameter(format!(
                "max gap must be positive, got {}",
                max_gap
            )));
        }
        // Fails early on a malformed key
        self.deriver.derive_addresses(xpubkey, 0, 1)?;

        let wallet_id = wallet_id_for(xpubkey);
        let now = Utc::now().timestamp();
        let wallet = {
            let repos = RepositoryFactory::create_repositories(self.pool.get_connection());
            match repos.wallet.find(&wallet_id).await? {
                Some(existing) if existing.status != WalletStatus::Error => return Ok(existing),
                Some(existing) => {
                    repos
                        .wallet
                        .set_status(&wallet_id, WalletStatus::Creating, None)
                        .await?;
                    Wallet {
                        status: WalletStatus::Creating,
                        ready_at: None,
                        ..existing
                    }
                }
                None => {
                    let wallet = Wallet {
                        wallet_id: wallet_id.clone(),
                        xpubkey: xpubkey.to_string(),
                        max_gap,
                        status: WalletStatus::Creating,
                        created_at: now,
                        ready_at: None,
                    };
                    repos.wallet.insert(&wallet).await?;
                    wallet
                }
            }
        };

        logging::log_info(&format!(
            "[{}] 👛 Loading wallet {} (max gap {})",
            self.config.network, wallet.wallet_id, wallet.max_gap
        ));

        match self.populate(&wallet, now).await {
            Ok(address_count) => {
                logging::log_info(&format!(
                    "[{}] ✅ Wallet {} ready with {} addresses",
                    self.config.network, wallet.wallet_id, address_count
                ));
                Ok(Wallet {
                    status: WalletStatus::Ready,
                    ready_at: Some(now),
                    ..wallet
                })
            }
            Err(e) => {
                logging::log_error(&format!(
                    "[{}] ❌ Failed to load wallet {}: {}",
                    self.config.network, wallet.wallet_id, e
                ));
                let repos = RepositoryFactory::create_repositories(self.pool.get_connection());
                if let Err(status_error) = repos
                    .wallet
                    .set_status(&wallet.wallet_id, WalletStatus::Error, None)
                    .await
                {
                    logging::log_error(&format!(
                        "[{}] ❌ Could not flag wallet {} as errored: {}",
                        self.config.network, wallet.wallet_id, status_error
                    ));
                }
                Err(e)
            }
        }
    }

    /// Claim addresses and seed projections; returns the wallet's address count
    async fn populate(&self, wallet: &Wallet, now: i64) -> Result<usize, WalletError> {
        // Ingest must not touch the wallet's addresses while it is seeded
        let _guard = self.gate.write().await;
        let txn = self.pool.begin().await?;
        let repos = RepositoryFactory::create_repositories(&txn);

        self.projector.maintain_gap(&repos, wallet).await?;
        let addresses: Vec<String> = repos
            .address
            .wallet_addresses(&wallet.wallet_id)
            .await?
            .into_iter()
            .map(|a| a.address)
            .collect();
        self.projector
            .seed_wallet_history(&repos, &wallet.wallet_id, &addresses)
            .await?;
        self.projector
            .rebuild_wallet_balances(&repos, &wallet.wallet_id)
            .await?;
        repos
            .wallet
            .set_status(&wallet.wallet_id, WalletStatus::Ready, Some(now))
            .await?;

        txn.commit().await?;
        Ok(addresses.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_id_is_sha256_hex_of_xpub() {
        let id = wallet_id_for("abc");
        assert_eq!(
            id,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_wallet_id_differs_per_xpub() {
        assert_ne!(wallet_id_for("xpub1"), wallet_id_for("xpub2"));
    }
}
