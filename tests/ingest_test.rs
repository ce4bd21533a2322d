mod common;

use common::*;
use wallet_indexer::application::indexer::{IngestOutcome, LedgerProcessor};
use wallet_indexer::config::{AppConfig, Network};
use wallet_indexer::domain::errors::IngestError;
use wallet_indexer::domain::models::{Authorities, TxPayload, NATIVE_TOKEN};

#[tokio::test]
async fn test_send_with_change_updates_both_addresses() {
    let ledger = Ledger::new().await;

    let funding = output("A", 10);
    ledger.ingest(&tx("tx1", 100, vec![], vec![funding.clone()])).await;
    ledger
        .ingest(&tx(
            "tx2",
            200,
            vec![spend("tx1", 0, &funding)],
            vec![output("B", 6), output("A", 4)],
        ))
        .await;

    let a = address_balance(&ledger.pool, "A", NATIVE_TOKEN).await;
    let b = address_balance(&ledger.pool, "B", NATIVE_TOKEN).await;
    assert_eq!(a.unlocked_balance, 4);
    assert_eq!(b.unlocked_balance, 6);
    assert_eq!(a.transactions, 2);
    assert_eq!(b.transactions, 1);

    let a_history = address_history(&ledger.pool, "A").await;
    let b_history = address_history(&ledger.pool, "B").await;
    assert_eq!(a_history.len(), 2);
    assert_eq!(b_history.len(), 1);
    assert_eq!(
        a_history.iter().map(|h| h.balance).collect::<Vec<_>>(),
        vec![10, -6]
    );
    assert_eq!(b_history[0].balance, 6);

    assert_eq!(unspent_sum(&ledger.pool, "A", NATIVE_TOKEN).await, (4, 0));
}

#[tokio::test]
async fn test_reingest_is_a_noop() {
    let ledger = Ledger::new().await;
    let payload = tx("tx1", 100, vec![], vec![output("A", 10)]);

    ledger.ingest(&payload).await;
    let outcome = ledger.processor.process_at(&payload, NOW).await.unwrap();

    assert_eq!(outcome, IngestOutcome::AlreadyProcessed);
    let a = address_balance(&ledger.pool, "A", NATIVE_TOKEN).await;
    assert_eq!(a.unlocked_balance, 10);
    assert_eq!(a.transactions, 1);
    assert_eq!(address_history(&ledger.pool, "A").await.len(), 1);
}

#[tokio::test]
async fn test_confirmation_only_updates_height() {
    let ledger = Ledger::new().await;
    let mempool = tx("tx1", 100, vec![], vec![output("A", 10)]);
    ledger.ingest(&mempool).await;

    let confirmed = TxPayload {
        height: Some(7),
        timestamp: 150,
        ..mempool.clone()
    };
    let outcome = ledger.processor.process_at(&confirmed, NOW).await.unwrap();
    assert_eq!(outcome, IngestOutcome::Confirmed);

    let record = tx_record(&ledger.pool, "tx1").await.unwrap();
    assert_eq!(record.height, Some(7));
    assert_eq!(record.timestamp, 150);
    assert!(!record.voided);

    let a = address_balance(&ledger.pool, "A", NATIVE_TOKEN).await;
    assert_eq!(a.unlocked_balance, 10);
    assert_eq!(a.transactions, 1);

    // A confirmed transaction delivered again stays untouched
    let again = ledger.processor.process_at(&confirmed, NOW).await.unwrap();
    assert_eq!(again, IngestOutcome::AlreadyProcessed);
}

#[tokio::test]
async fn test_ignored_transaction_is_rejected() {
    let config = AppConfig::with_database_url("sqlite::memory:", Network::Mainnet);
    let ledger = Ledger::with_config(config).await;
    let genesis = "000006cb93385b8b87a545a1cbb6197e6caff600c12cc12fc54250d39c8088fc";

    let result = ledger
        .processor
        .process_at(&tx(genesis, 1, vec![], vec![output("A", 10)]), NOW)
        .await;

    assert!(matches!(result, Err(IngestError::Rejected(id)) if id == genesis));
    assert!(tx_record(&ledger.pool, genesis).await.is_none());
}

#[tokio::test]
async fn test_authority_bits_follow_remaining_outputs() {
    let ledger = Ledger::new().await;

    let mint_a = authority_output("A", "tok", 1);
    let mint_b = authority_output("A", "tok", 1);
    let creation = TxPayload {
        version: 2,
        token_name: Some("Token".to_string()),
        token_symbol: Some("TKN".to_string()),
        ..tx(
            "tok",
            100,
            vec![],
            vec![mint_a.clone(), mint_b.clone(), token_output("A", 100, "tok")],
        )
    };
    ledger.ingest(&creation).await;

    let balance = address_balance(&ledger.pool, "A", "tok").await;
    assert_eq!(balance.unlocked_balance, 100);
    assert_eq!(balance.unlocked_authorities, Authorities::MINT);

    ledger
        .ingest(&tx("s1", 200, vec![spend("tok", 0, &mint_a)], vec![]))
        .await;
    let balance = address_balance(&ledger.pool, "A", "tok").await;
    assert_eq!(balance.unlocked_authorities, Authorities::MINT);

    ledger
        .ingest(&tx("s2", 300, vec![spend("tok", 1, &mint_b)], vec![]))
        .await;
    let balance = address_balance(&ledger.pool, "A", "tok").await;
    assert_eq!(balance.unlocked_authorities, Authorities::NONE);
    assert_eq!(balance.unlocked_balance, 100);
}

#[tokio::test]
async fn test_token_creation_requires_name_and_symbol() {
    let ledger = Ledger::new().await;
    let creation = TxPayload {
        version: 2,
        ..tx("tok", 100, vec![], vec![token_output("A", 5, "tok")])
    };

    let result = ledger.processor.process_at(&creation, NOW).await;

    assert!(matches!(result, Err(IngestError::InvalidPayload(_))));
    assert!(tx_record(&ledger.pool, "tok").await.is_none());
}

#[tokio::test]
async fn test_double_spend_rolls_back() {
    let ledger = Ledger::new().await;
    let funding = output("A", 10);
    ledger.ingest(&tx("tx1", 100, vec![], vec![funding.clone()])).await;
    ledger
        .ingest(&tx("tx2", 200, vec![spend("tx1", 0, &funding)], vec![output("B", 10)]))
        .await;

    let result = ledger
        .processor
        .process_at(
            &tx("tx3", 300, vec![spend("tx1", 0, &funding)], vec![output("C", 10)]),
            NOW,
        )
        .await;

    assert!(matches!(result, Err(IngestError::Consistency(_))));
    assert!(tx_record(&ledger.pool, "tx3").await.is_none());
    assert_eq!(address_balance(&ledger.pool, "C", NATIVE_TOKEN).await.unlocked_balance, 0);
}

#[tokio::test]
async fn test_timelock_sweep_unlocks_expired_outputs() {
    let ledger = Ledger::new().await;
    ledger
        .ingest(&tx("tx1", 100, vec![], vec![timelocked_output("A", 5, NOW + 100)]))
        .await;

    let locked = address_balance(&ledger.pool, "A", NATIVE_TOKEN).await;
    assert_eq!(locked.locked_balance, 5);
    assert_eq!(locked.unlocked_balance, 0);
    assert_eq!(locked.lock_expires, Some(NOW + 100));

    assert_eq!(ledger.processor.unlock_expired_timelocks(NOW + 50).await.unwrap(), 0);
    assert_eq!(ledger.processor.unlock_expired_timelocks(NOW + 100).await.unwrap(), 1);

    let unlocked = address_balance(&ledger.pool, "A", NATIVE_TOKEN).await;
    assert_eq!(unlocked.locked_balance, 0);
    assert_eq!(unlocked.unlocked_balance, 5);
    assert_eq!(unlocked.lock_expires, None);
}

#[tokio::test]
async fn test_spending_a_locked_output_unlocks_it_first() {
    let ledger = Ledger::new().await;
    let locked = timelocked_output("A", 5, NOW + 100);
    ledger.ingest(&tx("tx1", 100, vec![], vec![locked.clone()])).await;

    ledger
        .ingest(&tx("tx2", 200, vec![spend("tx1", 0, &locked)], vec![output("B", 5)]))
        .await;

    let a = address_balance(&ledger.pool, "A", NATIVE_TOKEN).await;
    assert_eq!(a.unlocked_balance, 0);
    assert_eq!(a.locked_balance, 0);
    assert_eq!(a.lock_expires, None);
    assert_eq!(address_balance(&ledger.pool, "B", NATIVE_TOKEN).await.unlocked_balance, 5);
}

#[tokio::test]
async fn test_block_rewards_mature_with_height() {
    let ledger = Ledger::with_reward_lock(2).await;

    ledger.ingest(&block("b1", 1, 100, vec![output("M", 64)])).await;
    let m = address_balance(&ledger.pool, "M", NATIVE_TOKEN).await;
    assert_eq!(m.locked_balance, 64);
    assert_eq!(m.unlocked_balance, 0);

    ledger.ingest(&block("b2", 2, 200, vec![output("M", 64)])).await;
    assert_eq!(
        address_balance(&ledger.pool, "M", NATIVE_TOKEN).await.unlocked_balance,
        0
    );

    ledger.ingest(&block("b3", 3, 300, vec![output("M", 64)])).await;
    let m = address_balance(&ledger.pool, "M", NATIVE_TOKEN).await;
    assert_eq!(m.unlocked_balance, 64);
    assert_eq!(m.locked_balance, 128);
    assert_eq!(unspent_sum(&ledger.pool, "M", NATIVE_TOKEN).await, (64, 128));
}

#[tokio::test]
async fn test_block_at_stored_height_reports_reorg() {
    let ledger = Ledger::new().await;
    ledger.ingest(&block("b1", 1, 100, vec![output("M", 64)])).await;

    let result = ledger
        .processor
        .process_at(&block("b1x", 1, 110, vec![output("N", 64)]), NOW)
        .await;

    match result {
        Err(IngestError::ReorgDetected {
            height,
            stored_block,
        }) => {
            assert_eq!(height, 1);
            assert_eq!(stored_block, "b1");
        }
        other => panic!("expected reorg, got {:?}", other),
    }
    assert_eq!(address_balance(&ledger.pool, "N", NATIVE_TOKEN).await.unlocked_balance, 0);
}

#[tokio::test]
async fn test_applied_transactions_are_published() {
    let mut ledger = Ledger::new().await;
    ledger.ingest(&tx("tx1", 100, vec![], vec![output("A", 10)])).await;

    let notification = ledger.notifications.recv().await.unwrap();
    assert_eq!(notification.tx.tx_id, "tx1");
    assert!(notification.wallets.is_empty());
}
