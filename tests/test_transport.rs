//! Integration tests for the retrying, multi-endpoint transport.

mod common;

use common::{fast_options, transport, MockNode, Reply};
use mm_eth::{rpc::EndpointHealth, AppError};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

/// Node that hangs on the first `n` requests, then answers.
fn hangs_first(n: usize) -> std::sync::Arc<MockNode> {
    MockNode::new(move |_, _, seen| if seen < n { Reply::Hang } else { Reply::Result(json!("0x1")) })
}

#[tokio::test]
async fn test_succeeds_when_retries_cover_timeouts() {
    for n in 1..=3 {
        let node = hangs_first(n);
        let transport = transport(&[node.clone()], fast_options(n));

        let result = assert_ok!(transport.call("eth_blockNumber", json!([])).await);
        assert_eq!(result, json!("0x1"));
        assert_eq!(node.calls("eth_blockNumber"), n + 1);
    }
}

#[tokio::test]
async fn test_times_out_when_retries_fall_short() {
    for n in 1..=3 {
        let node = hangs_first(n);
        let transport = transport(&[node.clone()], fast_options(n - 1));

        let err = assert_err!(transport.call("eth_blockNumber", json!([])).await);
        assert!(matches!(
            err.root(),
            AppError::Timeout { method, cause: None } if method == "eth_blockNumber"
        ));
        assert_eq!(node.calls("eth_blockNumber"), n);
    }
}

#[tokio::test]
async fn test_fails_over_to_second_endpoint() {
    let primary = MockNode::new(|_, _, _| Reply::Hang);
    let backup = MockNode::constant(json!("0xa"));
    let transport = transport(&[primary.clone(), backup.clone()], fast_options(4));

    let result = assert_ok!(transport.call("eth_chainId", json!([])).await);
    assert_eq!(result, json!("0xa"));
    assert_eq!(primary.calls("eth_chainId"), 2);
    assert_eq!(backup.calls("eth_chainId"), 1);

    let endpoints = transport.endpoints();
    assert_eq!(endpoints[0].health(), EndpointHealth::Degraded);
    assert_eq!(endpoints[1].health(), EndpointHealth::Healthy);

    // Degraded primary is skipped while the backup stays healthy.
    assert_ok!(transport.call("eth_chainId", json!([])).await);
    assert_eq!(primary.calls("eth_chainId"), 2);
    assert_eq!(backup.calls("eth_chainId"), 2);
}

#[tokio::test]
async fn test_refused_connections_are_retried() {
    let node = MockNode::new(|_, _, seen| {
        if seen < 2 {
            Reply::Refuse
        } else {
            Reply::Result(json!("0x5208"))
        }
    });
    let transport = transport(&[node.clone()], fast_options(2));

    let result = assert_ok!(transport.call("eth_estimateGas", json!([{}])).await);
    assert_eq!(result, json!("0x5208"));
    assert_eq!(node.calls("eth_estimateGas"), 3);
}

#[tokio::test]
async fn test_refused_connections_exhaust_as_timeout() {
    let node = MockNode::new(|_, _, _| Reply::Refuse);
    let transport = transport(&[node.clone()], fast_options(1));

    let err = assert_err!(transport.call("eth_getBalance", json!([])).await);
    match err.root() {
        AppError::Timeout { method, cause } => {
            assert_eq!(method, "eth_getBalance");
            assert!(cause.as_deref().is_some_and(|cause| cause.contains("connection refused")));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(node.calls("eth_getBalance"), 2);
}

#[tokio::test]
async fn test_node_errors_are_not_retried() {
    let node = MockNode::new(|_, _, _| Reply::Error(-32000, "nonce too low"));
    let transport = transport(&[node.clone()], fast_options(4));

    let err = assert_err!(transport.call("eth_sendRawTransaction", json!(["0x00"])).await);
    match err.root() {
        AppError::Rpc { code, message } => {
            assert_eq!(*code, -32000);
            assert_eq!(message, "nonce too low");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(node.calls("eth_sendRawTransaction"), 1);
    assert_eq!(transport.endpoints()[0].health(), EndpointHealth::Healthy);
}

#[tokio::test]
async fn test_batch_call_keeps_request_order() {
    let node = MockNode::new(|method, _, _| match method {
        "eth_chainId" => Reply::Result(json!("0x1")),
        "eth_blockNumber" => Reply::Result(json!("0x10")),
        _ => Reply::Error(-32601, "method not found"),
    });
    let transport = transport(&[node], fast_options(0));

    let results = assert_ok!(
        transport
            .batch_call(&[
                ("eth_blockNumber", json!([])),
                ("eth_foo", json!([])),
                ("eth_chainId", json!([])),
            ])
            .await
    );

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap(), &json!("0x10"));
    assert!(matches!(results[1], Err(AppError::Rpc { code: -32601, .. })));
    assert_eq!(results[2].as_ref().unwrap(), &json!("0x1"));
}

#[tokio::test]
async fn test_health_report_lists_every_endpoint() {
    let primary = MockNode::new(|_, _, _| Reply::Refuse);
    let backup = MockNode::constant(json!("0x1"));
    let transport = transport(&[primary, backup], fast_options(3));

    assert_ok!(transport.call("eth_chainId", json!([])).await);

    let health = transport.health();
    assert_eq!(health.len(), 2);
    assert_eq!(health[0].0, "mock://node-0");
    assert_eq!(health[0].1.health, EndpointHealth::Degraded);
    assert_eq!(health[1].1.health, EndpointHealth::Healthy);
}
