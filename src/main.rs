use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, RwLock};

use wallet_indexer::application::indexer::{LedgerFeed, ReorgResolver, TxProcessor};
use wallet_indexer::application::proposal::ProposalBuilder;
use wallet_indexer::config::AppConfig;
use wallet_indexer::domain::models::TxPayload;
use wallet_indexer::domain::services::{AddressDeriver, Bip32AddressDeriver};
use wallet_indexer::infrastructure::notify::notifier_from_config;
use wallet_indexer::infrastructure::peer::HttpChainPeer;
use wallet_indexer::infrastructure::persistence::DbPool;
use wallet_indexer::utils::logging;

const FEED_CAPACITY: usize = 1024;

/// Forward newline-delimited JSON payloads from stdin to the feed
async fn read_payloads(sender: mpsc::Sender<TxPayload>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match serde_json::from_str::<TxPayload>(&line) {
                Ok(payload) => {
                    if sender.send(payload).await.is_err() {
                        break;
                    }
                }
                Err(e) => logging::log_warning(&format!("⚠️ Skipping malformed payload: {}", e)),
            },
            Ok(None) => break,
            Err(e) => {
                logging::log_error(&format!("❌ Failed to read feed input: {}", e));
                break;
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logger();

    let config = AppConfig::from_env();
    let network = config.ledger.network;
    logging::log_info(&format!(
        "[{}] Starting wallet indexer v{}",
        network,
        env!("CARGO_PKG_VERSION")
    ));

    let pool = DbPool::new(&config).await?;
    let deriver: Arc<dyn AddressDeriver> =
        Arc::new(Bip32AddressDeriver::new(network.address_network()));
    let notifier = notifier_from_config(&config.feed)?;
    let gate = Arc::new(RwLock::new(()));

    let processor = Arc::new(TxProcessor::new(
        pool.clone(),
        deriver.clone(),
        notifier,
        config.ledger.clone(),
        gate.clone(),
    ));
    let resolver = Arc::new(ReorgResolver::new(
        pool.clone(),
        HttpChainPeer::new(&config)?,
        deriver.clone(),
        network,
        gate,
    ));
    let proposals = Arc::new(ProposalBuilder::new(
        pool.clone(),
        deriver,
        config.proposal.clone(),
    ));

    let feed = LedgerFeed::new(processor, resolver, Some(proposals), config.feed.clone());
    let (sender, receiver) = mpsc::channel(FEED_CAPACITY);
    let reader = tokio::spawn(read_payloads(sender));
    let mut feed_task = tokio::spawn(feed.run(receiver));

    tokio::select! {
        result = &mut feed_task => {
            result?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logging::log_info(&format!("[{}] 🛑 Shutdown requested", network));
            // Dropping the reader closes the channel; the feed drains what is queued
            reader.abort();
            feed_task.await?;
        }
    }

    Ok(())
}
