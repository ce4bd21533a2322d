//! Transaction ingest pipeline.
//!
//! Each payload is applied in a single database transaction: dedup, block
//! maturation, token creation, pre-spend unlock, UTXO store updates, address
//! projection and wallet projection. Notification happens after commit.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::ConnectionTrait;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::application::indexer::processor_trait::{IngestOutcome, LedgerProcessor};
use crate::application::indexer::projector::Projector;
use crate::config::{LedgerConfig, Network};
use crate::domain::errors::IngestError;
use crate::domain::models::{
    Authorities, TxPayload, TxRecord, TxVersion, Utxo, UtxoRef, WalletStatus,
};
use crate::domain::services::{AddressDeriver, BalanceCalculator};
use crate::infrastructure::notify::{TxNotification, TxNotifier};
use crate::infrastructure::persistence::{DbPool, Repositories, RepositoryFactory};
use crate::utils::logging;

/// Applies incoming transactions to the ledger projection
pub struct TxProcessor {
    pool: DbPool,
    projector: Projector,
    notifier: Arc<dyn TxNotifier>,
    config: LedgerConfig,
    gate: Arc<RwLock<()>>,
}

impl fmt::Debug for TxProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxProcessor")
            .field("network", &self.config.network)
            .finish_non_exhaustive()
    }
}

impl TxProcessor {
    /// `gate` is shared with the reorg resolver, which takes it exclusively
    pub fn new(
        pool: DbPool,
        deriver: Arc<dyn AddressDeriver>,
        notifier: Arc<dyn TxNotifier>,
        config: LedgerConfig,
        gate: Arc<RwLock<()>>,
    ) -> Self {
        Self {
            pool,
            projector: Projector::new(deriver),
            notifier,
            config,
            gate,
        }
    }

    /// Apply a payload with `now` as the current time
    pub async fn process_at(
        &self,
        payload: &TxPayload,
        now: i64,
    ) -> Result<IngestOutcome, IngestError> {
        if self.config.network.is_ignored(&payload.tx_id) {
            return Err(IngestError::Rejected(payload.tx_id.clone()));
        }
        if payload.is_block() && payload.height.is_none() {
            return Err(IngestError::InvalidPayload(format!(
                "block {} without height",
                payload.tx_id
            )));
        }

        let wallets = {
            let _guard = self.gate.read().await;
            let txn = self.pool.begin().await?;
            let repos = RepositoryFactory::create_repositories(&txn);

            if let Some(stored) = repos.transaction.find(&payload.tx_id).await? {
                if !stored.voided {
                    return match (stored.height, payload.height) {
                        (None, Some(height)) => {
                            repos
                                .transaction
                                .confirm(&payload.tx_id, height, payload.timestamp, payload.version)
                                .await?;
                            txn.commit().await?;
                            logging::log_debug(&format!(
                                "[{}] Confirmed tx {} at height {}",
                                self.config.network, payload.tx_id, height
                            ));
                            Ok(IngestOutcome::Confirmed)
                        }
                        _ => Ok(IngestOutcome::AlreadyProcessed),
                    };
                }
            }

            let wallets = self.apply(&repos, payload, now).await?;
            txn.commit().await?;
            wallets
        };

        logging::log_info(&format!(
            "[{}] ✅ Applied {} {} ({} inputs, {} outputs, {} wallets)",
            self.config.network,
            if payload.is_block() { "block" } else { "tx" },
            payload.tx_id,
            payload.inputs.len(),
            payload.outputs.len(),
            wallets.len()
        ));

        let notification = TxNotification {
            wallets: wallets.clone(),
            tx: payload.clone(),
        };
        if let Err(e) = self.notifier.notify(&notification).await {
            logging::log_warning(&format!(
                "[{}] ⚠️ Failed to notify tx {}: {}",
                self.config.network, payload.tx_id, e
            ));
        }

        Ok(IngestOutcome::Applied { wallets })
    }

    /// Timelock sweep at `now`
    pub async fn unlock_expired_timelocks_at(&self, now: i64) -> Result<usize, IngestError> {
        let _guard = self.gate.read().await;
        let txn = self.pool.begin().await?;
        let repos = RepositoryFactory::create_repositories(&txn);

        let best_height = repos.transaction.latest_block_height().await?;
        let expired = repos.utxo.find_expired_timelocks(now, best_height).await?;
        if expired.is_empty() {
            return Ok(0);
        }

        let refs: Vec<UtxoRef> = expired.iter().map(Utxo::reference).collect();
        repos.utxo.unlock(&refs, false).await?;
        self.projector.apply_unlock(&repos, &expired).await?;
        txn.commit().await?;

        logging::log_debug(&format!(
            "[{}] Unlocked {} timelocked outputs",
            self.config.network,
            expired.len()
        ));
        Ok(expired.len())
    }

    /// Steps run inside the unit of work for a transaction not seen before
    async fn apply<C: ConnectionTrait>(
        &self,
        repos: &Repositories<'_, C>,
        payload: &TxPayload,
        now: i64,
    ) -> Result<Vec<String>, IngestError> {
        let mut heightlock = None;
        if let (true, Some(height)) = (payload.is_block(), payload.height) {
            if let Some(stored) = repos.transaction.block_at_height(height).await? {
                if stored.tx_id != payload.tx_id {
                    return Err(IngestError::ReorgDetected {
                        height,
                        stored_block: stored.tx_id,
                    });
                }
            }

            // Rewards whose heightlock this block reaches become spendable
            let maturing = repos.utxo.find_maturing(now, height).await?;
            if !maturing.is_empty() {
                let refs: Vec<UtxoRef> = maturing.iter().map(Utxo::reference).collect();
                repos.utxo.unlock(&refs, true).await?;
                self.projector.apply_unlock(repos, &maturing).await?;
            }

            if self.config.block_reward_lock > 0 {
                heightlock = Some(height + self.config.block_reward_lock);
            }
        }

        if payload.kind() == TxVersion::CreateToken {
            let (name, symbol) = match (&payload.token_name, &payload.token_symbol) {
                (Some(name), Some(symbol)) => (name, symbol),
                _ => {
                    return Err(IngestError::InvalidPayload(format!(
                        "token creation {} without name or symbol",
                        payload.tx_id
                    )))
                }
            };
            repos
                .token
                .insert_if_absent(&payload.tx_id, name, symbol)
                .await?;
        }

        // Spending an output proves it is unlocked; catch up before balances move
        let input_refs: Vec<UtxoRef> = payload
            .inputs
            .iter()
            .map(|input| UtxoRef::new(&input.tx_id, input.index))
            .collect();
        let locked_inputs = repos.utxo.locked_from_inputs(&input_refs).await?;
        if !locked_inputs.is_empty() {
            let refs: Vec<UtxoRef> = locked_inputs.iter().map(Utxo::reference).collect();
            repos.utxo.unlock(&refs, false).await?;
            self.projector.apply_unlock(repos, &locked_inputs).await?;
        }

        repos
            .transaction
            .upsert(&TxRecord {
                tx_id: payload.tx_id.clone(),
                height: payload.height,
                timestamp: payload.timestamp,
                version: payload.version,
                voided: false,
            })
            .await?;

        let new_utxos = Self::utxos_from_outputs(payload, now, heightlock);
        repos.utxo.insert(&new_utxos).await?;

        let spend = repos.utxo.mark_spent(&input_refs, &payload.tx_id).await?;
        if let Some((utxo, spender)) = spend.conflicts.first() {
            return Err(IngestError::Consistency(format!(
                "output {}:{} spent by {} is already spent by {}",
                utxo.tx_id, utxo.index, payload.tx_id, spender
            )));
        }
        if !spend.missing.is_empty() {
            logging::log_debug(&format!(
                "[{}] {} inputs of {} reference unknown outputs",
                self.config.network,
                spend.missing.len(),
                payload.tx_id
            ));
        }

        let address_deltas = BalanceCalculator::address_balance_map(
            &payload.inputs,
            &payload.outputs,
            now,
            heightlock.is_some(),
        );
        self.projector
            .apply_address_deltas(repos, &payload.tx_id, payload.timestamp, &address_deltas)
            .await?;

        // Wallet linkage
        let addresses: Vec<String> = address_deltas.keys().cloned().collect();
        let wallet_ids: Vec<String> = repos
            .address
            .find_many(&addresses)
            .await?
            .into_iter()
            .filter_map(|a| a.wallet_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        // Wallet balances are read then written; holding the wallet rows
        // serializes concurrent ingests crediting the same wallet
        let wallets: Vec<_> = repos
            .wallet
            .lock_many(&wallet_ids)
            .await?
            .into_iter()
            .filter(|w| w.status == WalletStatus::Ready)
            .collect();
        if wallets.is_empty() {
            return Ok(Vec::new());
        }

        let mut to_rebuild = Vec::new();
        for wallet in &wallets {
            let gap = self.projector.maintain_gap(repos, wallet).await?;
            if !gap.new_addresses.is_empty() {
                logging::log_debug(&format!(
                    "[{}] Wallet {} gained {} addresses",
                    self.config.network,
                    wallet.wallet_id,
                    gap.new_addresses.len()
                ));
            }
            if gap.absorbed_history() {
                // Earlier transactions of claimed addresses join the wallet history
                self.projector
                    .seed_wallet_history(repos, &wallet.wallet_id, &gap.absorbed)
                    .await?;
                to_rebuild.push(wallet.wallet_id.clone());
            }
        }

        // Ownership may have changed while filling gaps
        let ready: BTreeSet<&String> = wallets.iter().map(|w| &w.wallet_id).collect();
        let address_wallets: HashMap<String, String> = repos
            .address
            .find_many(&addresses)
            .await?
            .into_iter()
            .filter_map(|a| match a.wallet_id {
                Some(wallet_id) if ready.contains(&wallet_id) => Some((a.address, wallet_id)),
                _ => None,
            })
            .collect();

        let wallet_deltas = BalanceCalculator::wallet_balance_map(&address_wallets, &address_deltas);
        self.projector
            .apply_wallet_deltas(repos, &payload.tx_id, payload.timestamp, &wallet_deltas)
            .await?;
        for wallet_id in &to_rebuild {
            self.projector.rebuild_wallet_balances(repos, wallet_id).await?;
        }

        Ok(wallet_deltas.keys().cloned().collect())
    }

    fn utxos_from_outputs(payload: &TxPayload, now: i64, heightlock: Option<i32>) -> Vec<Utxo> {
        payload
            .outputs
            .iter()
            .enumerate()
            .filter_map(|(index, output)| {
                let address = output.decoded.address.clone()?;
                let (value, authorities) = if output.is_authority() {
                    (0, Authorities(output.value as i32))
                } else {
                    (output.value, Authorities::NONE)
                };
                Some(Utxo {
                    tx_id: payload.tx_id.clone(),
                    index: index as i32,
                    token_id: output.token.clone(),
                    address,
                    value,
                    authorities,
                    timelock: output.decoded.timelock,
                    heightlock,
                    locked: BalanceCalculator::is_locked(
                        output.decoded.timelock,
                        now,
                        heightlock.is_some(),
                    ),
                    spent_by: None,
                    tx_proposal_id: None,
                    tx_proposal_index: None,
                })
            })
            .collect()
    }
}

#[async_trait]
impl LedgerProcessor for TxProcessor {
    fn network(&self) -> Network {
        self.config.network
    }

    async fn process(&self, payload: &TxPayload) -> Result<IngestOutcome, IngestError> {
        self.process_at(payload, Utc::now().timestamp()).await
    }

    async fn unlock_expired_timelocks(&self, now: i64) -> Result<usize, IngestError> {
        self.unlock_expired_timelocks_at(now).await
    }
}
