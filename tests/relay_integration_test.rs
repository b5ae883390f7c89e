//! Integration tests for the Jito relay
//!
//! Block engine and RPC node are both mocked over HTTP:
//! - bundle accepted and the tip signature confirms
//! - bundle accepted but its blockhash expires
//! - failover across block engines
//! - every block engine rejecting the bundle

use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    commitment_config::CommitmentConfig, hash::Hash, signature::Keypair,
    transaction::VersionedTransaction,
};
use std::sync::Arc;
use std::time::Duration;

use volume_bot::chain::BlockhashContext;
use volume_bot::relay::{BundleRelay, JitoRelay};
use volume_bot::test_utils::{mock_swap_transaction, wallet_slots};
use volume_bot::types::{Direction, TradeIntent};
use volume_bot::EngineError;

const BUNDLE_ID: &str = "b7c1f6a2d4e8";

fn blockhash() -> BlockhashContext {
    BlockhashContext {
        blockhash: Hash::new_unique(),
        last_valid_block_height: 1_000,
    }
}

fn swaps(n: usize) -> Vec<VersionedTransaction> {
    wallet_slots(n)
        .iter()
        .map(|slot| {
            mock_swap_transaction(&TradeIntent {
                slot_id: slot.id(),
                owner: slot.keypair_arc(),
                direction: Direction::Buy,
                amount_in: 10_000_000,
                min_amount_out: 9_900_000,
                remaining_accounts: vec![],
            })
            .unwrap()
        })
        .collect()
}

fn relay(rpc_url: String, engines: Vec<String>) -> JitoRelay {
    let rpc = Arc::new(RpcClient::new_with_commitment(
        rpc_url,
        CommitmentConfig::confirmed(),
    ));
    JitoRelay::new(
        rpc,
        Keypair::new(),
        engines,
        Duration::from_millis(10),
        Duration::from_secs(5),
    )
    .unwrap()
}

async fn accepting_engine() -> ServerGuard {
    let mut engine = Server::new_async().await;
    engine
        .mock("POST", "/api/v1/bundles")
        .match_body(Matcher::PartialJson(json!({ "method": "sendBundle" })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "jsonrpc": "2.0", "result": BUNDLE_ID, "id": 1 }).to_string())
        .create_async()
        .await;
    engine
}

async fn mock_rpc(server: &mut ServerGuard, method: &str, result: serde_json::Value) {
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": method })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "jsonrpc": "2.0", "result": result, "id": 1 }).to_string())
        .create_async()
        .await;
}

#[tokio::test]
async fn test_confirmed_bundle_reports_bundle_id() {
    let engine = accepting_engine().await;
    let mut rpc = Server::new_async().await;
    mock_rpc(
        &mut rpc,
        "getSignatureStatuses",
        json!({
            "context": { "slot": 300 },
            "value": [{
                "slot": 299,
                "confirmations": 1,
                "err": null,
                "status": { "Ok": null },
                "confirmationStatus": "confirmed"
            }]
        }),
    )
    .await;

    let outcome = relay(rpc.url(), vec![engine.url()])
        .submit_bundle(100_000, 4, swaps(2), &blockhash())
        .await
        .unwrap();

    assert!(outcome.confirmed);
    assert_eq!(outcome.bundle_id.as_deref(), Some(BUNDLE_ID));
}

#[tokio::test]
async fn test_expired_blockhash_is_unconfirmed_not_an_error() {
    let engine = accepting_engine().await;
    let mut rpc = Server::new_async().await;
    mock_rpc(
        &mut rpc,
        "getSignatureStatuses",
        json!({ "context": { "slot": 300 }, "value": [null] }),
    )
    .await;
    mock_rpc(&mut rpc, "getBlockHeight", json!(1_001)).await;

    let outcome = relay(rpc.url(), vec![engine.url()])
        .submit_bundle(100_000, 4, swaps(1), &blockhash())
        .await
        .unwrap();

    assert!(!outcome.confirmed);
    assert_eq!(outcome.bundle_id.as_deref(), Some(BUNDLE_ID));
}

#[tokio::test]
async fn test_failed_tip_transaction_is_unconfirmed() {
    let engine = accepting_engine().await;
    let mut rpc = Server::new_async().await;
    mock_rpc(
        &mut rpc,
        "getSignatureStatuses",
        json!({
            "context": { "slot": 300 },
            "value": [{
                "slot": 299,
                "confirmations": null,
                "err": { "InstructionError": [0, { "Custom": 1 }] },
                "status": { "Err": { "InstructionError": [0, { "Custom": 1 }] } },
                "confirmationStatus": "finalized"
            }]
        }),
    )
    .await;

    let outcome = relay(rpc.url(), vec![engine.url()])
        .submit_bundle(100_000, 4, swaps(1), &blockhash())
        .await
        .unwrap();

    assert!(!outcome.confirmed);
}

#[tokio::test]
async fn test_falls_over_to_next_block_engine() {
    let mut down = Server::new_async().await;
    let down_mock = down
        .mock("POST", "/api/v1/bundles")
        .with_status(503)
        .with_body("overloaded")
        .expect(1)
        .create_async()
        .await;
    let engine = accepting_engine().await;
    let mut rpc = Server::new_async().await;
    mock_rpc(
        &mut rpc,
        "getSignatureStatuses",
        json!({
            "context": { "slot": 300 },
            "value": [{
                "slot": 299,
                "confirmations": null,
                "err": null,
                "status": { "Ok": null },
                "confirmationStatus": "finalized"
            }]
        }),
    )
    .await;

    let outcome = relay(rpc.url(), vec![down.url(), engine.url()])
        .submit_bundle(100_000, 3, swaps(3), &blockhash())
        .await
        .unwrap();

    assert!(outcome.confirmed);
    down_mock.assert_async().await;
}

#[tokio::test]
async fn test_all_block_engines_rejecting_is_a_relay_error() {
    let mut first = Server::new_async().await;
    first
        .mock("POST", "/api/v1/bundles")
        .with_status(500)
        .create_async()
        .await;
    let mut second = Server::new_async().await;
    second
        .mock("POST", "/api/v1/bundles")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "jsonrpc": "2.0",
                "error": { "code": -32602, "message": "bundle contains an expired blockhash" },
                "id": 1
            })
            .to_string(),
        )
        .create_async()
        .await;
    let rpc = Server::new_async().await;

    let err = relay(rpc.url(), vec![first.url(), second.url()])
        .submit_bundle(100_000, 4, swaps(1), &blockhash())
        .await
        .unwrap_err();

    assert!(!err.is_fatal());
    match err {
        EngineError::Relay(message) => assert!(message.contains("expired blockhash")),
        other => panic!("expected relay error, got {:?}", other),
    }
}
