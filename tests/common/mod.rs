//! Common utilities for integration tests.

#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use mm_eth::{
    rpc::{Endpoint, EndpointKind, JsonRpcRequest, JsonRpcResponse, RpcConnection},
    ws::{WsChannel, WsConnector, WsEvent, WsEvents},
    AppError, Config, NodeClient, Result, RpcTransport, SubscriptionOptions, TransportOptions,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;

/// What a [`MockNode`] does with one request.
pub enum Reply {
    Result(Value),
    Error(i64, &'static str),
    /// Connection-level failure.
    Refuse,
    /// Never answers; the transport's timeout fires.
    Hang,
}

type Handler = Box<dyn Fn(&str, &Value, usize) -> Reply + Send + Sync>;

/// In-process node. The handler gets the method, params and how often the method was seen before.
pub struct MockNode {
    handler: Handler,
    calls: Mutex<Vec<(String, Value)>>,
}

impl MockNode {
    pub fn new(handler: impl Fn(&str, &Value, usize) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self { handler: Box::new(handler), calls: Mutex::new(Vec::new()) })
    }

    /// Answers every method with the same result.
    pub fn constant(result: Value) -> Arc<Self> {
        Self::new(move |_, _, _| Reply::Result(result.clone()))
    }

    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(m, _)| m == method).count()
    }

    pub fn params(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl RpcConnection for MockNode {
    async fn send(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse> {
        let seen = {
            let mut calls = self.calls.lock().unwrap();
            let seen = calls.iter().filter(|(m, _)| *m == request.method).count();
            calls.push((request.method.clone(), request.params.clone()));
            seen
        };

        match (self.handler)(&request.method, &request.params, seen) {
            Reply::Result(value) => Ok(JsonRpcResponse::success(request.id, value)),
            Reply::Error(code, message) => Ok(JsonRpcResponse::failure(request.id, code, message)),
            Reply::Refuse => Err(AppError::Transport("connection refused".into())),
            Reply::Hang => std::future::pending().await,
        }
    }

    async fn send_batch(&self, requests: &[JsonRpcRequest]) -> Result<Vec<JsonRpcResponse>> {
        let mut responses = Vec::with_capacity(requests.len());
        for request in requests {
            responses.push(self.send(request).await?);
        }
        Ok(responses)
    }
}

pub fn fast_options(max_retries: usize) -> TransportOptions {
    TransportOptions {
        request_timeout: Duration::from_millis(50),
        max_retries,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        ..TransportOptions::default()
    }
}

pub fn transport(nodes: &[Arc<MockNode>], options: TransportOptions) -> RpcTransport {
    let endpoints = nodes
        .iter()
        .enumerate()
        .map(|(priority, node)| {
            Endpoint::new(
                format!("mock://node-{priority}"),
                EndpointKind::Http,
                priority,
                node.clone() as Arc<dyn RpcConnection>,
            )
        })
        .collect();
    RpcTransport::new(endpoints, options).unwrap()
}

pub fn client(node: &Arc<MockNode>) -> NodeClient {
    NodeClient::new(transport(std::slice::from_ref(node), fast_options(1)))
}

/// Websocket stand-in. Connection `n` hands out subscription ids `0x{n}{k}`.
#[derive(Default)]
pub struct MockWs {
    pub connections: AtomicUsize,
    events: Mutex<Vec<mpsc::UnboundedSender<WsEvent>>>,
    pub requests: Arc<Mutex<Vec<(String, Value)>>>,
}

struct MockWsChannel {
    connection: usize,
    next: AtomicUsize,
    requests: Arc<Mutex<Vec<(String, Value)>>>,
}

#[async_trait]
impl WsChannel for MockWsChannel {
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        self.requests.lock().unwrap().push((method.to_string(), params));
        if method == "eth_subscribe" {
            let n = self.next.fetch_add(1, Ordering::SeqCst);
            return Ok(json!(format!("0x{}{}", self.connection, n)));
        }
        Ok(json!(true))
    }

    fn is_closed(&self) -> bool {
        false
    }
}

#[async_trait]
impl WsConnector for MockWs {
    async fn connect(&self) -> Result<(Arc<dyn WsChannel>, WsEvents)> {
        let connection = self.connections.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.events.lock().unwrap().push(tx);
        let channel = MockWsChannel {
            connection,
            next: AtomicUsize::new(0),
            requests: self.requests.clone(),
        };
        Ok((Arc::new(channel), rx))
    }
}

impl MockWs {
    pub fn emit(&self, connection: usize, subscription: &str, result: Value) {
        let events = self.events.lock().unwrap();
        let _ = events[connection]
            .send(WsEvent::Notification { subscription: subscription.into(), result });
    }

    pub fn drop_connection(&self, connection: usize) {
        let events = self.events.lock().unwrap();
        let _ = events[connection].send(WsEvent::Closed);
    }

    pub fn subscribe_calls(&self) -> usize {
        self.requests.lock().unwrap().iter().filter(|(m, _)| m == "eth_subscribe").count()
    }
}

pub fn fast_subscription_options() -> SubscriptionOptions {
    SubscriptionOptions {
        max_reconnect_attempts: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
    }
}

/// Wait up to one second for `condition`.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Helper to create a live client from environment variables.
pub async fn create_live_client() -> Option<NodeClient> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let config = Config::from_env().ok()?;
    NodeClient::from_config(&config).await.ok()
}

/// Skip test if no node is configured (missing env vars).
#[macro_export]
macro_rules! skip_if_no_client {
    () => {
        match common::create_live_client().await {
            Some(client) => client,
            None => {
                eprintln!("Skipping test: MM_ETH_NODES not set or unreachable");
                return;
            }
        }
    };
}
