use std::collections::BTreeSet;

use crate::domain::errors::{ProposalError, WalletError};
use crate::domain::models::{
    AddressInfo, HistoryEntry, ProposalInput, TokenBalance, TxProposal, Utxo, UtxoFilter, Wallet,
    WalletStatus,
};
use crate::infrastructure::persistence::{DbPool, RepositoryFactory};

/// Largest history page a caller can ask for
pub const MAX_HISTORY_PAGE: u64 = 15;

/// Read side of the wallet API
#[derive(Clone)]
pub struct WalletQueryService {
    pool: DbPool,
}

impl WalletQueryService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn wallet(&self, wallet_id: &str) -> Result<Wallet, WalletError> {
        let repos = RepositoryFactory::create_repositories(self.pool.get_connection());
        repos
            .wallet
            .find(wallet_id)
            .await?
            .ok_or_else(|| WalletError::NotFound(wallet_id.to_string()))
    }

    async fn ready_wallet(&self, wallet_id: &str) -> Result<Wallet, WalletError> {
        let wallet = self.wallet(wallet_id).await?;
        if wallet.status != WalletStatus::Ready {
            return Err(WalletError::NotReady(wallet_id.to_string()));
        }
        Ok(wallet)
    }

    /// Balances of a wallet, all tokens or only `token_id`
    pub async fn balances(
        &self,
        wallet_id: &str,
        token_id: Option<&str>,
    ) -> Result<Vec<TokenBalance>, WalletError> {
        self.ready_wallet(wallet_id).await?;
        let repos = RepositoryFactory::create_repositories(self.pool.get_connection());
        Ok(repos.balance.wallet_balances(wallet_id, token_id).await?)
    }

    /// History page, newest first. `count` is clamped to [`MAX_HISTORY_PAGE`].
    pub async fn history(
        &self,
        wallet_id: &str,
        skip: u64,
        count: u64,
    ) -> Result<Vec<HistoryEntry>, WalletError> {
        if count == 0 {
            return Err(WalletError::InvalidParameter(
                "count must be positive".to_string(),
            ));
        }
        self.ready_wallet(wallet_id).await?;
        let repos = RepositoryFactory::create_repositories(self.pool.get_connection());
        Ok(repos
            .history
            .wallet_history_page(wallet_id, skip, count.min(MAX_HISTORY_PAGE))
            .await?)
    }

    pub async fn addresses(&self, wallet_id: &str) -> Result<Vec<AddressInfo>, WalletError> {
        self.ready_wallet(wallet_id).await?;
        let repos = RepositoryFactory::create_repositories(self.pool.get_connection());
        Ok(repos.address.wallet_addresses(wallet_id).await?)
    }

    /// Unspent outputs of the wallet's addresses matching `filter`
    pub async fn utxos(&self, wallet_id: &str, filter: &UtxoFilter) -> Result<Vec<Utxo>, WalletError> {
        if filter.addresses.is_empty() {
            return Err(WalletError::InvalidParameter(
                "at least one address is required".to_string(),
            ));
        }
        self.ready_wallet(wallet_id).await?;

        let repos = RepositoryFactory::create_repositories(self.pool.get_connection());
        let owned: BTreeSet<String> = repos
            .address
            .wallet_addresses(wallet_id)
            .await?
            .into_iter()
            .map(|a| a.address)
            .collect();
        if let Some(foreign) = filter.addresses.iter().find(|a| !owned.contains(*a)) {
            return Err(WalletError::InvalidParameter(format!(
                "address {} does not belong to wallet {}",
                foreign, wallet_id
            )));
        }

        Ok(repos.utxo.filter(filter).await?)
    }

    /// Name and symbol of a custom token
    pub async fn token(&self, token_id: &str) -> Result<Option<(String, String)>, WalletError> {
        let repos = RepositoryFactory::create_repositories(self.pool.get_connection());
        Ok(repos.token.find(token_id).await?)
    }

    /// A stored proposal with its reserved inputs and outputs
    pub async fn proposal(&self, proposal_id: &str) -> Result<TxProposal, ProposalError> {
        let repos = RepositoryFactory::create_repositories(self.pool.get_connection());
        let record = repos
            .proposal
            .find(proposal_id)
            .await?
            .ok_or_else(|| ProposalError::ProposalNotFound(proposal_id.to_string()))?;

        let inputs = repos
            .utxo
            .proposal_inputs(proposal_id)
            .await?
            .into_iter()
            .map(|u| ProposalInput {
                tx_id: u.tx_id,
                index: u.index,
                token: u.token_id,
                address: u.address,
                value: u.value,
            })
            .collect();

        Ok(TxProposal {
            proposal_id: record.id,
            wallet_id: record.wallet_id,
            status: record.status,
            inputs,
            outputs: repos.proposal.outputs(proposal_id).await?,
        })
    }
}
