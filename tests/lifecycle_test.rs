use bigdecimal::BigDecimal;
use std::path::PathBuf;
use std::time::Duration;

use wallet_core::domain::TxKind;
use wallet_core::domain::TxStatus;
use wallet_core::tracker::SubmitParams;
use wallet_core::{Config, WalletCore};

fn config(rpc_url: String, gateway_url: String, ledger_path: Option<PathBuf>) -> Config {
    Config {
        rpc_url,
        gateway_url,
        network_id: "x402-testnet".to_string(),
        facilitator_endpoints: vec![],
        chain_id: 8453,
        request_timeout: Duration::from_secs(2),
        probe_interval: Duration::from_secs(60),
        confirmations: 1,
        ledger_path,
        persist_outcomes: false,
    }
}

fn transfer() -> SubmitParams {
    SubmitParams {
        sender: "0x1111111111111111111111111111111111111111".to_string(),
        recipient: "0x2222222222222222222222222222222222222222".to_string(),
        amount: "1.5".to_string(),
        asset_symbol: "ETH".to_string(),
        kind: TxKind::Send,
        payload: None,
        balance: Some(BigDecimal::from(10)),
    }
}

#[tokio::test]
async fn transfer_reaches_completed_through_the_full_stack() {
    let mut node = mockito::Server::new_async().await;
    let _broadcast = node
        .mock("POST", "/transfers")
        .with_status(200)
        .with_body(r#"{"hash":"0xfeed"}"#)
        .create_async()
        .await;
    let _wait = node
        .mock("GET", "/transfers/0xfeed/wait?confirmations=1")
        .with_status(200)
        .with_body(r#"{"status":"success","blockNumber":777,"feePaid":"0.00021","confirmations":1}"#)
        .create_async()
        .await;

    let core = WalletCore::new(config(
        node.url(),
        "http://127.0.0.1:1".to_string(),
        None,
    ))
    .await;

    let submission = core.submit_transfer(transfer()).await.unwrap();
    assert_eq!(submission.hash, "0xfeed");

    let record = core.ledger().find("0xfeed").await.unwrap();
    assert_eq!(record.status, TxStatus::Pending);

    submission.confirmation.join().await;

    let record = core.ledger().find("0xfeed").await.unwrap();
    assert_eq!(record.status, TxStatus::Completed);
    assert_eq!(record.block_height, Some(777));
    assert_eq!(record.chain_id, 8453);
}

#[tokio::test]
async fn ledger_survives_a_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("ledger.json");

    let mut node = mockito::Server::new_async().await;
    let _broadcast = node
        .mock("POST", "/transfers")
        .with_status(200)
        .with_body(r#"{"hash":"0xfeed"}"#)
        .create_async()
        .await;
    let _wait = node
        .mock("GET", "/transfers/0xfeed/wait?confirmations=1")
        .with_status(200)
        .with_body(r#"{"status":"success","blockNumber":777,"feePaid":"0.00021","confirmations":1}"#)
        .create_async()
        .await;

    let mut core = WalletCore::new(config(
        node.url(),
        "http://127.0.0.1:1".to_string(),
        Some(path.clone()),
    ))
    .await;

    let submission = core.submit_transfer(transfer()).await.unwrap();
    submission.confirmation.join().await;
    core.shutdown().await;

    let reopened = WalletCore::new(config(
        node.url(),
        "http://127.0.0.1:1".to_string(),
        Some(path),
    ))
    .await;
    let record = reopened.ledger().find("0xfeed").await.unwrap();
    assert_eq!(record.status, TxStatus::Completed);
}

#[tokio::test]
async fn rejected_broadcast_surfaces_and_writes_nothing() {
    let mut node = mockito::Server::new_async().await;
    let _broadcast = node
        .mock("POST", "/transfers")
        .with_status(400)
        .with_body(r#"{"error":"nonce too low"}"#)
        .create_async()
        .await;

    let core = WalletCore::new(config(
        node.url(),
        "http://127.0.0.1:1".to_string(),
        None,
    ))
    .await;

    assert!(core.submit_transfer(transfer()).await.is_err());
    assert!(core.ledger().pending().await.is_empty());
}

#[tokio::test]
async fn network_stats_degrade_to_local_view() {
    // Neither the gateway nor any facilitator is reachable.
    let core = WalletCore::new(config(
        "http://127.0.0.1:1".to_string(),
        "http://127.0.0.1:1".to_string(),
        None,
    ))
    .await;

    let stats = core.network_stats().await;
    assert_eq!(stats.active_facilitators, 0);
}
