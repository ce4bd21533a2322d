mod common;

use std::sync::Arc;

use common::*;
use wallet_indexer::application::indexer::{
    FeedError, IngestOutcome, LedgerFeed, LedgerProcessor,
};
use wallet_indexer::domain::errors::ReorgError;
use wallet_indexer::domain::models::NATIVE_TOKEN;

/// Two blocks, a transaction confirmed by the second one and a mempool spend of it
async fn seeded_ledger() -> Ledger {
    let ledger = Ledger::new().await;
    ledger.ingest(&block("b1", 1, 100, vec![output("M", 50)])).await;
    ledger.ingest(&block("b2", 2, 200, vec![output("M", 50)])).await;

    let funding = output("A", 10);
    let t1 = tx("t1", 150, vec![], vec![funding.clone()]);
    ledger.ingest(&t1).await;
    ledger
        .ingest(&wallet_indexer::domain::models::TxPayload {
            height: Some(2),
            ..t1
        })
        .await;
    ledger
        .ingest(&tx("t2", 250, vec![spend("t1", 0, &funding)], vec![output("B", 10)]))
        .await;
    ledger
}

async fn assert_balances_match_utxos(ledger: &Ledger, addresses: &[&str]) {
    for address in addresses {
        let balance = address_balance(&ledger.pool, address, NATIVE_TOKEN).await;
        let (unlocked, locked) = unspent_sum(&ledger.pool, address, NATIVE_TOKEN).await;
        assert_eq!(balance.unlocked_balance, unlocked, "unlocked of {}", address);
        assert_eq!(balance.locked_balance, locked, "locked of {}", address);
    }
}

#[tokio::test]
async fn test_last_common_block() {
    let ledger = seeded_ledger().await;

    let resolver = ledger.resolver(FakePeer::new(&[(1, "b1"), (2, "b2x")]));
    assert_eq!(
        resolver.find_last_common_block().await.unwrap(),
        (1, "b1".to_string())
    );

    let diverged = ledger.resolver(FakePeer::new(&[(1, "b1x"), (2, "b2x")]));
    assert!(matches!(
        diverged.find_last_common_block().await,
        Err(ReorgError::NoCommonBlock)
    ));
}

#[tokio::test]
async fn test_reorg_voids_blocks_and_returns_transactions_to_mempool() {
    let ledger = seeded_ledger().await;
    assert_eq!(address_balance(&ledger.pool, "M", NATIVE_TOKEN).await.unlocked_balance, 100);

    let resolver = ledger.resolver(FakePeer::new(&[(1, "b1"), (2, "b2x")]));
    let outcome = resolver.resolve().await.unwrap();

    assert_eq!(outcome.common_height, 1);
    assert_eq!(outcome.voided, vec!["b2".to_string()]);
    assert_eq!(outcome.unconfirmed, vec!["t1".to_string()]);

    assert_eq!(tx_record(&ledger.pool, "t1").await.unwrap().height, None);
    assert!(tx_record(&ledger.pool, "b2").await.is_none());

    assert_eq!(address_balance(&ledger.pool, "M", NATIVE_TOKEN).await.unlocked_balance, 50);
    assert_eq!(address_balance(&ledger.pool, "B", NATIVE_TOKEN).await.unlocked_balance, 10);
    assert_eq!(address_history(&ledger.pool, "M").await.len(), 1);
    assert_balances_match_utxos(&ledger, &["M", "A", "B"]).await;
}

#[tokio::test]
async fn test_void_cascades_to_spenders() {
    let ledger = seeded_ledger().await;
    let resolver = ledger.resolver(FakePeer::new(&[(1, "b1"), (2, "b2")]));

    let voided = resolver.void_transaction("t1").await.unwrap();

    assert_eq!(voided, vec!["t1".to_string(), "t2".to_string()]);
    assert!(tx_record(&ledger.pool, "t1").await.unwrap().voided);
    assert!(tx_record(&ledger.pool, "t2").await.unwrap().voided);
    assert_eq!(address_balance(&ledger.pool, "A", NATIVE_TOKEN).await.unlocked_balance, 0);
    assert_eq!(address_balance(&ledger.pool, "B", NATIVE_TOKEN).await.unlocked_balance, 0);
    assert!(address_history(&ledger.pool, "B").await.is_empty());
    assert_balances_match_utxos(&ledger, &["M", "A", "B"]).await;

    // Voiding again is a no-op
    assert!(resolver.void_transaction("t1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_voided_transaction_is_reprocessed_as_new() {
    let ledger = seeded_ledger().await;
    let resolver = ledger.resolver(FakePeer::new(&[(1, "b1"), (2, "b2")]));
    resolver.void_transaction("t2").await.unwrap();
    assert_eq!(address_balance(&ledger.pool, "A", NATIVE_TOKEN).await.unlocked_balance, 10);

    let funding = output("A", 10);
    let outcome = ledger
        .processor
        .process_at(
            &tx("t2", 250, vec![spend("t1", 0, &funding)], vec![output("B", 10)]),
            NOW,
        )
        .await
        .unwrap();

    assert!(matches!(outcome, IngestOutcome::Applied { .. }));
    assert!(!tx_record(&ledger.pool, "t2").await.unwrap().voided);
    assert_eq!(address_balance(&ledger.pool, "B", NATIVE_TOKEN).await.unlocked_balance, 10);
    assert_eq!(address_history(&ledger.pool, "B").await.len(), 1);
    assert_balances_match_utxos(&ledger, &["A", "B"]).await;
}

#[tokio::test]
async fn test_feed_resolves_reorg_and_applies_new_block() {
    let ledger = seeded_ledger().await;
    let processor: Arc<dyn LedgerProcessor> = ledger.processor.clone();
    let resolver = Arc::new(ledger.resolver(FakePeer::new(&[(1, "b1"), (2, "b2x")])));
    let mut feed = LedgerFeed::new(processor, resolver, None, ledger.config.feed.clone());

    let outcome = feed
        .handle(&block("b2x", 2, 210, vec![output("N", 50)]))
        .await
        .unwrap();

    assert!(matches!(outcome, IngestOutcome::Applied { .. }));
    assert_eq!(feed.stats().reorgs, 1);
    assert_eq!(feed.stats().applied, 1);
    assert_eq!(address_balance(&ledger.pool, "M", NATIVE_TOKEN).await.unlocked_balance, 50);
    assert_eq!(address_balance(&ledger.pool, "N", NATIVE_TOKEN).await.unlocked_balance, 50);
    assert_balances_match_utxos(&ledger, &["M", "N", "A", "B"]).await;
}

#[tokio::test]
async fn test_feed_drops_block_the_peer_does_not_know() {
    let ledger = seeded_ledger().await;
    let processor: Arc<dyn LedgerProcessor> = ledger.processor.clone();
    let resolver = Arc::new(ledger.resolver(FakePeer::new(&[(1, "b1"), (2, "b2")])));
    let mut feed = LedgerFeed::new(processor, resolver, None, ledger.config.feed.clone());

    let result = feed
        .handle(&block("b2x", 2, 210, vec![output("N", 50)]))
        .await;

    assert!(matches!(result, Err(FeedError::UnresolvedReorg { height: 2, .. })));
    assert_eq!(feed.stats().errors, 1);
    assert!(tx_record(&ledger.pool, "b2").await.is_some());
    assert_eq!(address_balance(&ledger.pool, "N", NATIVE_TOKEN).await.unlocked_balance, 0);
}

#[tokio::test]
async fn test_rewards_matured_by_voided_block_stay_unlocked() {
    let ledger = Ledger::with_reward_lock(1).await;
    ledger.ingest(&block("b1", 1, 100, vec![output("M", 50)])).await;
    ledger.ingest(&block("b2", 2, 200, vec![output("M", 50)])).await;
    assert_eq!(unspent_sum(&ledger.pool, "M", NATIVE_TOKEN).await, (50, 50));

    let resolver = ledger.resolver(FakePeer::new(&[(1, "b1"), (2, "b2x")]));
    resolver.resolve().await.unwrap();

    let m = address_balance(&ledger.pool, "M", NATIVE_TOKEN).await;
    assert_eq!(m.unlocked_balance, 50);
    assert_eq!(m.locked_balance, 0);
    assert_balances_match_utxos(&ledger, &["M"]).await;
}
