mod common;

use common::*;
use wallet_indexer::config::{AppConfig, Network};
use wallet_indexer::domain::errors::ProposalError;
use wallet_indexer::domain::models::{
    OutputRequest, ProposalRequest, ProposalStatus, UtxoRef, Wallet, NATIVE_TOKEN,
};

/// Wallet holding outputs of 7, 4 and 1 on its first address
async fn funded_wallet(ledger: &Ledger) -> Wallet {
    let wallet = ledger.load_wallet("xpubP").await;
    ledger
        .ingest(&tx(
            "f1",
            100,
            vec![],
            vec![output("xpubP-0", 7), output("xpubP-0", 4), output("xpubP-0", 1)],
        ))
        .await;
    wallet
}

fn pay(wallet: &Wallet, address: &str, value: i64) -> ProposalRequest {
    ProposalRequest {
        wallet_id: wallet.wallet_id.clone(),
        outputs: vec![OutputRequest {
            address: address.to_string(),
            value,
            token: NATIVE_TOKEN.to_string(),
            timelock: None,
        }],
        inputs: None,
        input_selection_algo: None,
    }
}

#[tokio::test]
async fn test_largest_first_proposal_with_change() {
    let ledger = Ledger::new().await;
    let wallet = funded_wallet(&ledger).await;

    let proposal = ledger
        .proposals()
        .create_at(&pay(&wallet, "ext", 9), NOW)
        .await
        .unwrap();

    assert_eq!(proposal.status, ProposalStatus::Open);
    let mut input_values: Vec<i64> = proposal.inputs.iter().map(|i| i.value).collect();
    input_values.sort_unstable();
    assert_eq!(input_values, vec![4, 7]);

    assert_eq!(proposal.outputs.len(), 2);
    let change = proposal
        .outputs
        .iter()
        .find(|o| o.address != "ext")
        .unwrap();
    assert_eq!(change.address, "xpubP-1");
    assert_eq!(change.value, 2);

    let stored = ledger.query().proposal(&proposal.proposal_id).await.unwrap();
    assert_eq!(stored.status, ProposalStatus::Open);
    assert_eq!(stored.inputs, proposal.inputs);
    assert_eq!(stored.outputs, proposal.outputs);
}

#[tokio::test]
async fn test_reserved_outputs_are_not_selected_again() {
    let ledger = Ledger::new().await;
    let wallet = funded_wallet(&ledger).await;
    let builder = ledger.proposals();

    builder.create_at(&pay(&wallet, "ext", 9), NOW).await.unwrap();
    let second = builder.create_at(&pay(&wallet, "ext", 1), NOW).await.unwrap();
    assert_eq!(second.inputs.len(), 1);
    assert_eq!(second.inputs[0].value, 1);

    let third = builder.create_at(&pay(&wallet, "ext", 1), NOW).await;
    assert!(matches!(
        third,
        Err(ProposalError::InsufficientInputs { available: 0, .. })
    ));
}

#[tokio::test]
async fn test_concurrent_proposals_share_no_input() {
    let ledger = Ledger::new().await;
    let wallet = funded_wallet(&ledger).await;
    let builder = ledger.proposals();

    let request = ProposalRequest {
        inputs: Some(vec![UtxoRef::new("f1", 0)]),
        ..pay(&wallet, "ext", 5)
    };
    let (first, second) = tokio::join!(
        builder.create_at(&request, NOW),
        builder.create_at(&request, NOW)
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let failure = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(matches!(failure, ProposalError::ReservationConflict(refs) if refs == &vec![UtxoRef::new("f1", 0)]));
    assert_eq!(failure.code(), "INPUTS_ALREADY_USED");
}

#[tokio::test]
async fn test_request_validation() {
    let ledger = Ledger::new().await;
    let wallet = funded_wallet(&ledger).await;
    let builder = ledger.proposals();

    let empty = ProposalRequest {
        outputs: vec![],
        ..pay(&wallet, "ext", 1)
    };
    assert!(matches!(
        builder.create_at(&empty, NOW).await,
        Err(ProposalError::MissingParameter(_))
    ));
    assert!(matches!(
        builder.create_at(&pay(&wallet, "bad-address", 1), NOW).await,
        Err(ProposalError::InvalidPayload(_))
    ));
    assert!(matches!(
        builder.create_at(&pay(&wallet, "ext", 0), NOW).await,
        Err(ProposalError::InvalidPayload(_))
    ));

    let unknown_algo = ProposalRequest {
        input_selection_algo: Some("random".to_string()),
        ..pay(&wallet, "ext", 1)
    };
    assert!(matches!(
        builder.create_at(&unknown_algo, NOW).await,
        Err(ProposalError::InvalidSelectionAlgo(name)) if name == "random"
    ));

    let unknown_wallet = ProposalRequest {
        wallet_id: "missing".to_string(),
        ..pay(&wallet, "ext", 1)
    };
    assert!(matches!(
        builder.create_at(&unknown_wallet, NOW).await,
        Err(ProposalError::WalletNotFound(_))
    ));

    match builder.create_at(&pay(&wallet, "ext", 13), NOW).await {
        Err(ProposalError::InsufficientFunds {
            requested,
            available,
            ..
        }) => {
            assert_eq!(requested, 13);
            assert_eq!(available, 12);
        }
        other => panic!("expected insufficient funds, got {:?}", other),
    }

    let missing_input = ProposalRequest {
        inputs: Some(vec![UtxoRef::new("f1", 0), UtxoRef::new("nope", 3)]),
        ..pay(&wallet, "ext", 1)
    };
    assert!(matches!(
        builder.create_at(&missing_input, NOW).await,
        Err(ProposalError::InputsNotFound(refs)) if refs == vec![UtxoRef::new("nope", 3)]
    ));
}

#[tokio::test]
async fn test_change_counts_against_output_limit() {
    let mut config = AppConfig::with_database_url("sqlite::memory:", Network::Privatenet);
    config.ledger.block_reward_lock = 0;
    config.ledger.default_max_gap = 3;
    config.proposal.max_outputs = 1;
    let ledger = Ledger::with_config(config).await;
    let wallet = funded_wallet(&ledger).await;

    let exact = ledger.proposals().create_at(&pay(&wallet, "ext", 7), NOW).await;
    assert!(exact.is_ok());

    let with_change = ledger.proposals().create_at(&pay(&wallet, "ext", 3), NOW).await;
    assert!(matches!(
        with_change,
        Err(ProposalError::TooManyOutputs { max: 1, requested: 2 })
    ));
}

#[tokio::test]
async fn test_cancel_releases_inputs() {
    let ledger = Ledger::new().await;
    let wallet = funded_wallet(&ledger).await;
    let builder = ledger.proposals();

    let request = ProposalRequest {
        inputs: Some(vec![UtxoRef::new("f1", 0)]),
        ..pay(&wallet, "ext", 7)
    };
    let first = builder.create_at(&request, NOW).await.unwrap();
    builder.cancel(&first.proposal_id, NOW + 1).await.unwrap();

    let stored = ledger.query().proposal(&first.proposal_id).await.unwrap();
    assert_eq!(stored.status, ProposalStatus::Cancelled);
    assert!(stored.inputs.is_empty());

    assert!(builder.create_at(&request, NOW + 2).await.is_ok());

    assert!(matches!(
        builder.cancel(&first.proposal_id, NOW + 3).await,
        Err(ProposalError::InvalidStatus { status, .. }) if status == "cancelled"
    ));
    assert!(matches!(
        builder.cancel("unknown", NOW).await,
        Err(ProposalError::ProposalNotFound(_))
    ));
}

#[tokio::test]
async fn test_sent_proposal_cannot_be_cancelled() {
    let ledger = Ledger::new().await;
    let wallet = funded_wallet(&ledger).await;
    let builder = ledger.proposals();

    let proposal = builder.create_at(&pay(&wallet, "ext", 1), NOW).await.unwrap();
    builder.mark_sent(&proposal.proposal_id, NOW + 1).await.unwrap();

    assert!(matches!(
        builder.cancel(&proposal.proposal_id, NOW + 2).await,
        Err(ProposalError::InvalidStatus { status, .. }) if status == "sent"
    ));
}

#[tokio::test]
async fn test_stale_proposals_expire() {
    let ledger = Ledger::new().await;
    let wallet = funded_wallet(&ledger).await;
    let builder = ledger.proposals();
    let ttl = ledger.config.proposal.ttl_secs;

    let proposal = builder.create_at(&pay(&wallet, "ext", 9), NOW).await.unwrap();

    assert!(builder.expire_stale(NOW + ttl).await.unwrap().is_empty());
    let expired = builder.expire_stale(NOW + ttl + 1).await.unwrap();
    assert_eq!(expired, vec![proposal.proposal_id.clone()]);

    let stored = ledger.query().proposal(&proposal.proposal_id).await.unwrap();
    assert_eq!(stored.status, ProposalStatus::Expired);
    assert!(stored.inputs.is_empty());

    // Released inputs are selectable again
    let again = builder.create_at(&pay(&wallet, "ext", 9), NOW + ttl + 2).await.unwrap();
    assert_eq!(again.inputs.len(), 2);
}
