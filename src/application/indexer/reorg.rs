//! Reorg resolution.
//!
//! Finds the newest stored block the peer still agrees with, voids every
//! block above it together with the transactions depending on their outputs,
//! returns the remaining confirmed transactions to the mempool and rebuilds
//! the affected projections from the UTXO store.

use sea_orm::ConnectionTrait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::application::indexer::projector::Projector;
use crate::config::Network;
use crate::domain::errors::ReorgError;
use crate::domain::models::{TxRecord, TxVersion, WalletStatus};
use crate::domain::services::AddressDeriver;
use crate::infrastructure::peer::ChainPeer;
use crate::infrastructure::persistence::{DbPool, Repositories, RepositoryFactory};
use crate::utils::logging;

/// Summary of a resolved reorg
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorgOutcome {
    pub common_height: i32,
    pub common_block: String,
    /// Blocks and transactions voided, cascade included
    pub voided: Vec<String>,
    /// Transactions returned to the mempool
    pub unconfirmed: Vec<String>,
}

pub struct ReorgResolver<P> {
    pool: DbPool,
    peer: P,
    projector: Projector,
    network: Network,
    gate: Arc<RwLock<()>>,
}

impl<P: ChainPeer> ReorgResolver<P> {
    pub fn new(
        pool: DbPool,
        peer: P,
        deriver: Arc<dyn AddressDeriver>,
        network: Network,
        gate: Arc<RwLock<()>>,
    ) -> Self {
        Self {
            pool,
            peer,
            projector: Projector::new(deriver),
            network,
            gate,
        }
    }

    /// Walk stored blocks from the best one down until the peer agrees
    pub async fn find_last_common_block(&self) -> Result<(i32, String), ReorgError> {
        let repos = RepositoryFactory::create_repositories(self.pool.get_connection());

        for block in repos.transaction.blocks_descending().await? {
            let Some(height) = block.height else {
                continue;
            };
            match self.peer.block_id_at_height(height).await? {
                Some(canonical) if canonical == block.tx_id => return Ok((height, block.tx_id)),
                canonical => logging::log_debug(&format!(
                    "[{}] Block {} at height {} diverges from peer ({:?})",
                    self.network, block.tx_id, height, canonical
                )),
            }
        }

        Err(ReorgError::NoCommonBlock)
    }

    /// Bring the projection back to the last block shared with the peer.
    /// Rewards matured by a voided block stay unlocked; their heightlock is already cleared.
    pub async fn resolve(&self) -> Result<ReorgOutcome, ReorgError> {
        let _guard = self.gate.write().await;
        let (common_height, common_block) = self.find_last_common_block().await?;

        let txn = self.pool.begin().await?;
        let repos = RepositoryFactory::create_repositories(&txn);

        let above: Vec<TxRecord> = repos.transaction.after_height(common_height).await?;
        let blocks: Vec<String> = above
            .iter()
            .filter(|t| TxVersion::from(t.version).is_block())
            .map(|t| t.tx_id.clone())
            .collect();

        let voided = self.void_cascade(&repos, blocks).await?;

        let unconfirmed: Vec<String> = above
            .iter()
            .filter(|t| !TxVersion::from(t.version).is_block() && !voided.contains(&t.tx_id))
            .map(|t| t.tx_id.clone())
            .collect();
        repos.transaction.clear_height(&unconfirmed).await?;
        repos
            .transaction
            .delete_blocks_after_height(common_height)
            .await?;

        txn.commit().await?;

        logging::log_warning(&format!(
            "[{}] 🔄 Reorg resolved at height {} ({}): {} voided, {} back to mempool",
            self.network,
            common_height,
            common_block,
            voided.len(),
            unconfirmed.len()
        ));

        Ok(ReorgOutcome {
            common_height,
            common_block,
            voided: voided.into_iter().collect(),
            unconfirmed,
        })
    }

    /// Void a single transaction reported invalid by the peer, with its dependents
    pub async fn void_transaction(&self, tx_id: &str) -> Result<Vec<String>, ReorgError> {
        let _guard = self.gate.write().await;
        let txn = self.pool.begin().await?;
        let repos = RepositoryFactory::create_repositories(&txn);

        match repos.transaction.find(tx_id).await? {
            Some(record) if !record.voided => {}
            _ => return Ok(Vec::new()),
        }

        let voided = self.void_cascade(&repos, vec![tx_id.to_string()]).await?;
        txn.commit().await?;

        logging::log_warning(&format!(
            "[{}] 🗑️ Voided {} transactions starting at {}",
            self.network,
            voided.len(),
            tx_id
        ));
        Ok(voided.into_iter().collect())
    }

    /// Void `roots` and every transaction spending an output of a voided one,
    /// then rebuild the projections they touched
    async fn void_cascade<C: ConnectionTrait>(
        &self,
        repos: &Repositories<'_, C>,
        roots: Vec<String>,
    ) -> Result<BTreeSet<String>, ReorgError> {
        let mut voided: BTreeSet<String> = BTreeSet::new();
        let mut frontier = roots;
        while !frontier.is_empty() {
            voided.extend(frontier.iter().cloned());
            let spenders: BTreeSet<String> = repos
                .utxo
                .owned_by(&frontier)
                .await?
                .into_iter()
                .filter_map(|u| u.spent_by)
                .filter(|spender| !voided.contains(spender))
                .collect();
            frontier = spenders.into_iter().collect();
        }

        if voided.is_empty() {
            return Ok(voided);
        }
        let voided_list: Vec<String> = voided.iter().cloned().collect();

        let mut affected: BTreeSet<String> = repos.history.addresses_of_txs(&voided_list).await?;
        for utxo in repos.utxo.owned_by(&voided_list).await? {
            affected.insert(utxo.address);
        }
        for utxo in repos.utxo.spent_by(&voided_list).await? {
            affected.insert(utxo.address);
        }

        repos.utxo.unspend_by(&voided_list).await?;
        repos.utxo.delete_owned_by(&voided_list).await?;
        repos.transaction.mark_voided(&voided_list).await?;
        repos.history.mark_voided(&voided_list).await?;

        let affected: Vec<String> = affected.into_iter().collect();
        self.projector
            .rebuild_address_balances(repos, &affected)
            .await?;

        let wallet_ids: Vec<String> = repos
            .address
            .find_many(&affected)
            .await?
            .into_iter()
            .filter_map(|a| a.wallet_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        for wallet in repos.wallet.find_many(&wallet_ids).await? {
            if wallet.status == WalletStatus::Ready {
                self.projector
                    .rebuild_wallet_balances(repos, &wallet.wallet_id)
                    .await?;
            }
        }

        Ok(voided)
    }
}
