#![allow(dead_code)]

use async_trait::async_trait;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use wallet_indexer::application::indexer::{ReorgResolver, TxProcessor};
use wallet_indexer::application::proposal::ProposalBuilder;
use wallet_indexer::application::wallet::{WalletLoader, WalletQueryService};
use wallet_indexer::config::{AppConfig, Network};
use wallet_indexer::domain::errors::DerivationError;
use wallet_indexer::domain::models::{
    Authorities, DecodedScript, HistoryEntry, TokenBalance, TxInput, TxOutput, TxPayload,
    TxRecord, Wallet, NATIVE_TOKEN, TOKEN_AUTHORITY_MASK,
};
use wallet_indexer::domain::services::AddressDeriver;
use wallet_indexer::infrastructure::notify::{ChannelNotifier, TxNotification};
use wallet_indexer::infrastructure::peer::{ChainPeer, PeerError};
use wallet_indexer::infrastructure::persistence::{DbPool, RepositoryFactory};
use wallet_indexer::utils::logging;

pub const NOW: i64 = 10_000;

/// Derives `<xpub>-<index>`; addresses starting with `bad` are invalid
pub struct FakeDeriver;

impl AddressDeriver for FakeDeriver {
    fn derive_addresses(
        &self,
        xpubkey: &str,
        start: u32,
        count: u32,
    ) -> Result<Vec<(i32, String)>, DerivationError> {
        if xpubkey.is_empty() {
            return Err(DerivationError::InvalidXpub("empty".to_string()));
        }
        Ok((start..start + count)
            .map(|i| (i as i32, format!("{}-{}", xpubkey, i)))
            .collect())
    }

    fn is_valid_address(&self, address: &str) -> bool {
        !address.is_empty() && !address.starts_with("bad")
    }
}

/// Peer answering from a fixed height -> block id map
pub struct FakePeer {
    pub blocks: HashMap<i32, String>,
}

impl FakePeer {
    pub fn new(blocks: &[(i32, &str)]) -> Self {
        Self {
            blocks: blocks.iter().map(|(h, id)| (*h, id.to_string())).collect(),
        }
    }
}

#[async_trait]
impl ChainPeer for FakePeer {
    async fn block_id_at_height(&self, height: i32) -> Result<Option<String>, PeerError> {
        Ok(self.blocks.get(&height).cloned())
    }
}

/// In-memory SQLite database with the ledger schema
pub async fn setup_pool() -> DbPool {
    logging::init_test_logger();

    let mut options = ConnectOptions::new("sqlite::memory:".to_string());
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let connection = Database::connect(options)
        .await
        .expect("sqlite connection");
    Migrator::up(&connection, None)
        .await
        .expect("migrations");

    DbPool::from_connection(connection)
}

/// Everything a test needs to drive the ledger
pub struct Ledger {
    pub pool: DbPool,
    pub config: AppConfig,
    pub deriver: Arc<dyn AddressDeriver>,
    pub gate: Arc<RwLock<()>>,
    pub processor: Arc<TxProcessor>,
    pub notifications: mpsc::UnboundedReceiver<TxNotification>,
}

impl Ledger {
    pub async fn new() -> Self {
        Self::with_reward_lock(0).await
    }

    pub async fn with_reward_lock(block_reward_lock: i32) -> Self {
        let mut config = AppConfig::with_database_url("sqlite::memory:", Network::Privatenet);
        config.ledger.block_reward_lock = block_reward_lock;
        config.ledger.default_max_gap = 3;
        Self::with_config(config).await
    }

    pub async fn with_config(config: AppConfig) -> Self {
        let pool = setup_pool().await;
        let deriver: Arc<dyn AddressDeriver> = Arc::new(FakeDeriver);
        let gate = Arc::new(RwLock::new(()));
        let (notifier, notifications) = ChannelNotifier::channel();

        let processor = Arc::new(TxProcessor::new(
            pool.clone(),
            deriver.clone(),
            Arc::new(notifier),
            config.ledger.clone(),
            gate.clone(),
        ));

        Self {
            pool,
            config,
            deriver,
            gate,
            processor,
            notifications,
        }
    }

    pub async fn ingest(&self, payload: &TxPayload) {
        self.processor
            .process_at(payload, NOW)
            .await
            .unwrap_or_else(|e| panic!("ingest of {} failed: {}", payload.tx_id, e));
    }

    pub fn loader(&self) -> WalletLoader {
        WalletLoader::new(
            self.pool.clone(),
            self.deriver.clone(),
            self.config.ledger.clone(),
            self.gate.clone(),
        )
    }

    pub async fn load_wallet(&self, xpubkey: &str) -> Wallet {
        self.loader()
            .load(xpubkey, None)
            .await
            .expect("wallet load")
    }

    pub fn query(&self) -> WalletQueryService {
        WalletQueryService::new(self.pool.clone())
    }

    pub fn proposals(&self) -> ProposalBuilder {
        ProposalBuilder::new(
            self.pool.clone(),
            self.deriver.clone(),
            self.config.proposal.clone(),
        )
    }

    pub fn resolver(&self, peer: FakePeer) -> ReorgResolver<FakePeer> {
        ReorgResolver::new(
            self.pool.clone(),
            peer,
            self.deriver.clone(),
            self.config.ledger.network,
            self.gate.clone(),
        )
    }
}

pub fn output(address: &str, value: i64) -> TxOutput {
    token_output(address, value, NATIVE_TOKEN)
}

pub fn token_output(address: &str, value: i64, token: &str) -> TxOutput {
    TxOutput {
        value,
        token_data: if token == NATIVE_TOKEN { 0 } else { 1 },
        token: token.to_string(),
        decoded: DecodedScript {
            address: Some(address.to_string()),
            timelock: None,
        },
    }
}

/// Authority output carrying `mask` (mint=1, melt=2)
pub fn authority_output(address: &str, token: &str, mask: i64) -> TxOutput {
    TxOutput {
        value: mask,
        token_data: TOKEN_AUTHORITY_MASK | 1,
        token: token.to_string(),
        decoded: DecodedScript {
            address: Some(address.to_string()),
            timelock: None,
        },
    }
}

pub fn timelocked_output(address: &str, value: i64, timelock: i64) -> TxOutput {
    TxOutput {
        decoded: DecodedScript {
            address: Some(address.to_string()),
            timelock: Some(timelock),
        },
        ..output(address, value)
    }
}

/// Input spending output `index` of `tx_id`, which is `spent`
pub fn spend(tx_id: &str, index: i32, spent: &TxOutput) -> TxInput {
    TxInput {
        tx_id: tx_id.to_string(),
        index,
        value: spent.value,
        token_data: spent.token_data,
        token: spent.token.clone(),
        decoded: spent.decoded.clone(),
    }
}

pub fn tx(tx_id: &str, timestamp: i64, inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> TxPayload {
    TxPayload {
        tx_id: tx_id.to_string(),
        height: None,
        timestamp,
        version: 1,
        inputs,
        outputs,
        token_name: None,
        token_symbol: None,
    }
}

pub fn block(tx_id: &str, height: i32, timestamp: i64, outputs: Vec<TxOutput>) -> TxPayload {
    TxPayload {
        tx_id: tx_id.to_string(),
        height: Some(height),
        timestamp,
        version: 0,
        inputs: Vec::new(),
        outputs,
        token_name: None,
        token_symbol: None,
    }
}

/// Stored balance of an address for a token, zero when there is no row
pub async fn address_balance(pool: &DbPool, address: &str, token_id: &str) -> TokenBalance {
    let repos = RepositoryFactory::create_repositories(pool.get_connection());
    repos
        .balance
        .address_balances(&[address.to_string()])
        .await
        .expect("address balances")
        .into_iter()
        .map(|(_, balance)| balance)
        .find(|b| b.token_id == token_id)
        .unwrap_or_else(|| zero_balance(token_id))
}

pub fn zero_balance(token_id: &str) -> TokenBalance {
    TokenBalance {
        token_id: token_id.to_string(),
        unlocked_balance: 0,
        locked_balance: 0,
        lock_expires: None,
        unlocked_authorities: Authorities::NONE,
        locked_authorities: Authorities::NONE,
        transactions: 0,
    }
}

/// Sum of the unspent outputs of an address for a token, as (unlocked, locked)
pub async fn unspent_sum(pool: &DbPool, address: &str, token_id: &str) -> (i64, i64) {
    let repos = RepositoryFactory::create_repositories(pool.get_connection());
    repos
        .utxo
        .unspent_for_addresses(&[address.to_string()])
        .await
        .expect("unspent outputs")
        .into_iter()
        .filter(|u| u.token_id == token_id)
        .fold((0, 0), |(unlocked, locked), u| {
            if u.locked {
                (unlocked, locked + u.value)
            } else {
                (unlocked + u.value, locked)
            }
        })
}

pub async fn address_history(pool: &DbPool, address: &str) -> Vec<HistoryEntry> {
    let repos = RepositoryFactory::create_repositories(pool.get_connection());
    repos
        .history
        .address_history(&[address.to_string()])
        .await
        .expect("address history")
        .into_iter()
        .map(|(_, entry)| entry)
        .collect()
}

pub async fn tx_record(pool: &DbPool, tx_id: &str) -> Option<TxRecord> {
    let repos = RepositoryFactory::create_repositories(pool.get_connection());
    repos.transaction.find(tx_id).await.expect("transaction lookup")
}
