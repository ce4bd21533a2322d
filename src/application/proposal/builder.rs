use chrono::Utc;
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::ProposalConfig;
use crate::domain::errors::ProposalError;
use crate::domain::models::{
    ProposalInput, ProposalOutput, ProposalRequest, ProposalStatus, TxProposal, Utxo, UtxoRef,
    WalletStatus,
};
use crate::domain::services::{AddressDeriver, SelectorRegistry};
use crate::infrastructure::persistence::repositories::ProposalRecord;
use crate::infrastructure::persistence::{DbPool, RepositoryFactory};
use crate::utils::logging;

/// Per-token sum of requested outputs
fn requested_by_token(outputs: &[ProposalOutput]) -> BTreeMap<String, i64> {
    let mut totals = BTreeMap::new();
    for output in outputs {
        *totals.entry(output.token.clone()).or_insert(0) += output.value;
    }
    totals
}

fn inputs_by_token(inputs: &[Utxo]) -> BTreeMap<String, i64> {
    let mut totals = BTreeMap::new();
    for input in inputs {
        *totals.entry(input.token_id.clone()).or_insert(0) += input.value;
    }
    totals
}

/// Change outputs for tokens whose inputs exceed the requested amount.
/// Change goes to `change_addresses` in order, wrapping around when there are
/// more tokens than addresses.
fn change_outputs(
    requested: &BTreeMap<String, i64>,
    provided: &BTreeMap<String, i64>,
    change_addresses: &[String],
) -> Result<Vec<ProposalOutput>, ProposalError> {
    let tokens: BTreeSet<&String> = requested.keys().chain(provided.keys()).collect();

    let mut change = Vec::new();
    for token in tokens {
        let wanted = requested.get(token).copied().unwrap_or(0);
        let available = provided.get(token).copied().unwrap_or(0);
        if wanted > available {
            return Err(ProposalError::InsufficientInputs {
                token_id: token.clone(),
                requested: wanted,
                available,
            });
        }
        if available > wanted {
            if change_addresses.is_empty() {
                return Err(ProposalError::NoChangeAddress);
            }
            change.push(ProposalOutput {
                address: change_addresses[change.len() % change_addresses.len()].clone(),
                value: available - wanted,
                token: token.clone(),
                timelock: None,
            });
        }
    }

    Ok(change)
}

/// Builds, reserves and tracks transaction proposals
#[derive(Clone)]
pub struct ProposalBuilder {
    pool: DbPool,
    deriver: Arc<dyn AddressDeriver>,
    selectors: SelectorRegistry,
    config: ProposalConfig,
}

impl ProposalBuilder {
    pub fn new(pool: DbPool, deriver: Arc<dyn AddressDeriver>, config: ProposalConfig) -> Self {
        Self::with_selectors(pool, deriver, config, SelectorRegistry::default())
    }

    pub fn with_selectors(
        pool: DbPool,
        deriver: Arc<dyn AddressDeriver>,
        config: ProposalConfig,
        selectors: SelectorRegistry,
    ) -> Self {
        Self {
            pool,
            deriver,
            selectors,
            config,
        }
    }

    pub async fn create(&self, request: &ProposalRequest) -> Result<TxProposal, ProposalError> {
        self.create_at(request, Utc::now().timestamp()).await
    }

    /// Build a proposal and reserve its inputs, with `now` as creation time
    pub async fn create_at(
        &self,
        request: &ProposalRequest,
        now: i64,
    ) -> Result<TxProposal, ProposalError> {
        let mut outputs = self.validate_outputs(request)?;
        let algo = request.input_selection_algo.as_deref();
        let selector = self.selectors.get(algo).ok_or_else(|| {
            ProposalError::InvalidSelectionAlgo(algo.unwrap_or_default().to_string())
        })?;

        let txn = self.pool.begin().await?;
        let repos = RepositoryFactory::create_repositories(&txn);

        let wallet = repos
            .wallet
            .find(&request.wallet_id)
            .await?
            .ok_or_else(|| ProposalError::WalletNotFound(request.wallet_id.clone()))?;
        if wallet.status != WalletStatus::Ready {
            return Err(ProposalError::WalletNotReady(wallet.wallet_id));
        }

        let requested = requested_by_token(&outputs);
        for (token_id, amount) in &requested {
            let available = repos
                .balance
                .wallet_balance(&wallet.wallet_id, token_id)
                .await?
                .map(|b| b.unlocked_balance)
                .unwrap_or(0);
            if available < *amount {
                return Err(ProposalError::InsufficientFunds {
                    token_id: token_id.clone(),
                    requested: *amount,
                    available,
                });
            }
        }

        let inputs: Vec<Utxo> = match &request.inputs {
            Some(refs) => {
                if refs.len() > self.config.max_inputs {
                    return Err(ProposalError::TooManyInputs {
                        max: self.config.max_inputs,
                        requested: refs.len(),
                    });
                }

                let owned: BTreeSet<String> = repos
                    .address
                    .wallet_addresses(&wallet.wallet_id)
                    .await?
                    .into_iter()
                    .map(|a| a.address)
                    .collect();
                let fetched: Vec<Utxo> = repos
                    .utxo
                    .get(refs)
                    .await?
                    .into_iter()
                    .filter(|u| owned.contains(&u.address))
                    .collect();
                let found: BTreeSet<UtxoRef> = fetched.iter().map(Utxo::reference).collect();
                let missing: Vec<UtxoRef> =
                    refs.iter().filter(|r| !found.contains(*r)).cloned().collect();
                if !missing.is_empty() {
                    return Err(ProposalError::InputsNotFound(missing));
                }

                // Keep the caller's order
                let mut by_ref: BTreeMap<UtxoRef, Utxo> =
                    fetched.into_iter().map(|u| (u.reference(), u)).collect();
                refs.iter().filter_map(|r| by_ref.remove(r)).collect()
            }
            None => {
                let mut selected = Vec::new();
                for (token_id, amount) in &requested {
                    let candidates = repos
                        .utxo
                        .select_spendable(&wallet.wallet_id, token_id)
                        .await?;
                    selected.extend(selector.select(&candidates, *amount));
                }
                if selected.len() > self.config.max_inputs {
                    return Err(ProposalError::TooManyInputs {
                        max: self.config.max_inputs,
                        requested: selected.len(),
                    });
                }
                selected
            }
        };

        let change_addresses = repos.address.unused_addresses(&wallet.wallet_id).await?;
        let change = change_outputs(&requested, &inputs_by_token(&inputs), &change_addresses)?;
        outputs.extend(change);
        if outputs.len() > self.config.max_outputs {
            return Err(ProposalError::TooManyOutputs {
                max: self.config.max_outputs,
                requested: outputs.len(),
            });
        }
        outputs.shuffle(&mut rand::rng());

        let proposal_id = Uuid::new_v4().to_string();
        repos
            .proposal
            .insert(&proposal_id, &wallet.wallet_id, now, &outputs)
            .await?;

        let refs: Vec<UtxoRef> = inputs.iter().map(Utxo::reference).collect();
        let conflicts = repos.utxo.reserve(&proposal_id, &refs).await?;
        if !conflicts.is_empty() {
            return Err(ProposalError::ReservationConflict(conflicts));
        }

        txn.commit().await?;

        logging::log_info(&format!(
            "📝 Created tx proposal {} for wallet {} ({} inputs, {} outputs)",
            proposal_id,
            wallet.wallet_id,
            inputs.len(),
            outputs.len()
        ));

        Ok(TxProposal {
            proposal_id,
            wallet_id: wallet.wallet_id,
            status: ProposalStatus::Open,
            inputs: inputs
                .into_iter()
                .map(|u| ProposalInput {
                    tx_id: u.tx_id,
                    index: u.index,
                    token: u.token_id,
                    address: u.address,
                    value: u.value,
                })
                .collect(),
            outputs,
        })
    }

    /// Record that the proposal's transaction was pushed to the network
    pub async fn mark_sent(&self, proposal_id: &str, now: i64) -> Result<(), ProposalError> {
        let txn = self.pool.begin().await?;
        let repos = RepositoryFactory::create_repositories(&txn);

        if !repos
            .proposal
            .transition(proposal_id, ProposalStatus::Open, ProposalStatus::Sent, now)
            .await?
        {
            return Err(Self::not_open(&repos.proposal.find(proposal_id).await?, proposal_id));
        }

        txn.commit().await?;
        Ok(())
    }

    /// Cancel an open proposal and release its inputs
    pub async fn cancel(&self, proposal_id: &str, now: i64) -> Result<(), ProposalError> {
        let txn = self.pool.begin().await?;
        let repos = RepositoryFactory::create_repositories(&txn);

        if !repos
            .proposal
            .transition(proposal_id, ProposalStatus::Open, ProposalStatus::Cancelled, now)
            .await?
        {
            return Err(Self::not_open(&repos.proposal.find(proposal_id).await?, proposal_id));
        }
        let released = repos.utxo.release(proposal_id).await?;
        txn.commit().await?;

        logging::log_debug(&format!(
            "Cancelled tx proposal {} ({} inputs released)",
            proposal_id, released
        ));
        Ok(())
    }

    /// Expire open proposals older than the configured TTL; returns their ids
    pub async fn expire_stale(&self, now: i64) -> Result<Vec<String>, ProposalError> {
        let txn = self.pool.begin().await?;
        let repos = RepositoryFactory::create_repositories(&txn);

        let mut expired = Vec::new();
        for proposal_id in repos
            .proposal
            .open_created_before(now - self.config.ttl_secs)
            .await?
        {
            if repos
                .proposal
                .transition(&proposal_id, ProposalStatus::Open, ProposalStatus::Expired, now)
                .await?
            {
                repos.utxo.release(&proposal_id).await?;
                expired.push(proposal_id);
            }
        }

        txn.commit().await?;
        Ok(expired)
    }

    fn validate_outputs(&self, request: &ProposalRequest) -> Result<Vec<ProposalOutput>, ProposalError> {
        if request.outputs.is_empty() {
            return Err(ProposalError::MissingParameter("outputs".to_string()));
        }
        if request.outputs.len() > self.config.max_outputs {
            return Err(ProposalError::TooManyOutputs {
                max: self.config.max_outputs,
                requested: request.outputs.len(),
            });
        }

        request
            .outputs
            .iter()
            .map(|output| {
                if !self.deriver.is_valid_address(&output.address) {
                    return Err(ProposalError::InvalidPayload(format!(
                        "invalid address {}",
                        output.address
                    )));
                }
                if output.value <= 0 {
                    return Err(ProposalError::InvalidPayload(format!(
                        "output value must be positive, got {}",
                        output.value
                    )));
                }
                Ok(ProposalOutput {
                    address: output.address.clone(),
                    value: output.value,
                    token: output.token.clone(),
                    timelock: output.timelock,
                })
            })
            .collect()
    }

    fn not_open(record: &Option<ProposalRecord>, proposal_id: &str) -> ProposalError {
        match record {
            Some(record) => ProposalError::InvalidStatus {
                proposal_id: proposal_id.to_string(),
                status: record.status.to_string(),
            },
            None => ProposalError::ProposalNotFound(proposal_id.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals(entries: &[(&str, i64)]) -> BTreeMap<String, i64> {
        entries.iter().map(|(t, v)| (t.to_string(), *v)).collect()
    }

    #[test]
    fn test_change_for_excess_inputs() {
        let change = change_outputs(
            &totals(&[("00", 6)]),
            &totals(&[("00", 10)]),
            &["C1".to_string()],
        )
        .unwrap();
        assert_eq!(change.len(), 1);
        assert_eq!(change[0].address, "C1");
        assert_eq!(change[0].value, 4);
        assert_eq!(change[0].token, "00");
    }

    #[test]
    fn test_exact_inputs_need_no_change_address() {
        let change = change_outputs(&totals(&[("00", 5)]), &totals(&[("00", 5)]), &[]).unwrap();
        assert!(change.is_empty());
    }

    #[test]
    fn test_short_inputs_rejected() {
        let err = change_outputs(&totals(&[("00", 9)]), &totals(&[("00", 8)]), &[]).unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_INPUTS");
    }

    #[test]
    fn test_change_addresses_cycle() {
        let change = change_outputs(
            &totals(&[("00", 1), ("t1", 1), ("t2", 1)]),
            &totals(&[("00", 2), ("t1", 2), ("t2", 2)]),
            &["C1".to_string(), "C2".to_string()],
        )
        .unwrap();
        let addresses: Vec<&str> = change.iter().map(|c| c.address.as_str()).collect();
        assert_eq!(addresses, vec!["C1", "C2", "C1"]);
    }

    #[test]
    fn test_missing_change_address() {
        let err = change_outputs(&totals(&[("00", 1)]), &totals(&[("00", 3)]), &[]).unwrap_err();
        assert!(matches!(err, ProposalError::NoChangeAddress));
    }

    #[test]
    fn test_requested_by_token_sums_outputs() {
        let outputs = vec![
            ProposalOutput {
                address: "A".into(),
                value: 2,
                token: "00".into(),
                timelock: None,
            },
            ProposalOutput {
                address: "B".into(),
                value: 3,
                token: "00".into(),
                timelock: None,
            },
        ];
        assert_eq!(requested_by_token(&outputs), totals(&[("00", 5)]));
    }
}
