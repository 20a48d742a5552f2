//! Integration tests against a real node configured through `MM_ETH_NODES`.
//!
//! Run with: `cargo test --test test_live_node -- --ignored`

mod common;

use std::time::Duration;

use alloy::primitives::address;
use mm_eth::types::{format_units, Unit};

/// Test basic chain queries.
#[tokio::test]
#[ignore = "Requires network access and environment variables"]
async fn test_chain_queries() {
    let client = skip_if_no_client!();

    let chain_id = client.chain_id().await;
    assert!(chain_id.is_ok(), "chain_id should succeed: {:?}", chain_id.err());

    let block = client.block_number().await.unwrap();
    assert!(block > 0);

    let latest = client.latest_block().await.unwrap();
    assert!(latest.number.to::<u64>() >= block);

    println!("Chain {} at block {}", chain_id.unwrap(), block);
}

/// Test querying ETH balance for Vitalik's address.
#[tokio::test]
#[ignore = "Requires network access and environment variables"]
async fn test_get_balance() {
    let client = skip_if_no_client!();

    let vitalik = address!("d8dA6BF26964aF9D7eEd9e03E53415D37aA96045");
    let balance = client.get_balance(vitalik).await;
    assert!(balance.is_ok(), "get_balance should succeed: {:?}", balance.err());

    let nonce = client.get_transaction_count(vitalik).await.unwrap();
    println!("Balance: {} ETH, nonce {}", format_units(balance.unwrap(), Unit::Ether.decimals()), nonce);
}

/// Test fee suggestion on a post-London chain.
#[tokio::test]
#[ignore = "Requires network access and environment variables"]
async fn test_suggest_fees() {
    let client = skip_if_no_client!();

    let fees = client.suggest_fees().await.unwrap();
    assert!(fees.max_fee_per_gas >= fees.base_fee_per_gas);
    assert!(fees.max_fee_per_gas >= fees.max_priority_fee_per_gas);
}

/// Test receiving a block header over the websocket.
#[tokio::test]
#[ignore = "Requires network access and a websocket endpoint"]
async fn test_new_heads() {
    let client = skip_if_no_client!();
    if client.subscriptions().is_none() {
        eprintln!("Skipping test: no websocket endpoint configured");
        return;
    }

    let mut heads = client.subscribe_new_heads().await.unwrap();
    let header = tokio::time::timeout(Duration::from_secs(60), heads.next_header())
        .await
        .expect("a block should arrive within a minute")
        .expect("subscription should stay open")
        .unwrap();
    println!("New head: {} ({})", header.number, header.hash);
}
