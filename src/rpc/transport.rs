//! Multi-endpoint JSON-RPC transport with retry, backoff and health-based failover.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::{sleep, timeout, Instant};

use super::{
    endpoint::{Endpoint, EndpointKind, EndpointSnapshot, RpcConnection},
    http::HttpConnection,
    jsonrpc::{correlate, JsonRpcRequest},
    options::TransportOptions,
};
use crate::{
    error::{AppError, Result},
    ws::{TungsteniteConnector, WsRpcConnection},
};

pub struct RpcTransport {
    endpoints: Vec<Arc<Endpoint>>,
    options: TransportOptions,
    next_id: AtomicU64,
}

impl RpcTransport {
    /// Build a transport over `endpoints`. Their priority decides ties between equally healthy ones.
    pub fn new(endpoints: Vec<Endpoint>, options: TransportOptions) -> Result<Self> {
        options.validate()?;
        if endpoints.is_empty() {
            return Err(AppError::Config("At least one node endpoint is required".into()));
        }

        Ok(Self {
            endpoints: endpoints.into_iter().map(Arc::new).collect(),
            options,
            next_id: AtomicU64::new(1),
        })
    }

    /// Build HTTP or websocket connections for `urls`, in priority order.
    pub fn from_urls<S: AsRef<str>>(urls: &[S], options: TransportOptions) -> Result<Self> {
        let endpoints = urls
            .iter()
            .enumerate()
            .map(|(priority, url)| {
                let url = url.as_ref().trim();
                let kind = EndpointKind::from_url(url)?;
                let connection: Arc<dyn RpcConnection> = match kind {
                    EndpointKind::Http => {
                        Arc::new(HttpConnection::new(url, options.request_timeout)?)
                    }
                    EndpointKind::WebSocket => Arc::new(WsRpcConnection::new(Arc::new(
                        TungsteniteConnector::new(url, options.request_timeout),
                    ))),
                };
                tracing::info!(rpc_url = %url, kind = ?kind, priority, "Node endpoint configured");
                Ok(Endpoint::new(url, kind, priority, connection))
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(endpoints, options)
    }

    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// Health of every endpoint, in configured order.
    pub fn health(&self) -> Vec<(String, EndpointSnapshot)> {
        self.endpoints.iter().map(|e| (e.url().to_string(), e.snapshot())).collect()
    }

    /// Issue one request and return its `result`.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request = JsonRpcRequest::new(self.next_id(), method, params);

        self.with_retries(method, |endpoint| {
            let request = &request;
            async move {
                let response = endpoint.connection().send(request).await?;
                if response.id != Some(request.id) {
                    return Err(AppError::Transport(format!(
                        "Response id {:?} does not match request id {}",
                        response.id, request.id
                    )));
                }
                response.into_result()
            }
        })
        .await
    }

    /// [`Self::call`] and deserialize the result.
    pub async fn call_as<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let value = self.call(method, params).await?;
        serde_json::from_value(value)
            .map_err(|e| AppError::Parse(format!("Unexpected {method} result: {e}")))
    }

    /// Send several requests in one round-trip. Results are in call order.
    pub async fn batch_call(&self, calls: &[(&str, Value)]) -> Result<Vec<Result<Value>>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let requests: Vec<JsonRpcRequest> = calls
            .iter()
            .map(|(method, params)| JsonRpcRequest::new(self.next_id(), *method, params.clone()))
            .collect();
        let ids: Vec<u64> = requests.iter().map(|r| r.id).collect();

        self.with_retries("batch", |endpoint| {
            let requests = &requests;
            let ids = &ids;
            async move {
                let responses = endpoint.connection().send_batch(requests).await?;
                Ok(correlate(ids, responses))
            }
        })
        .await
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Healthiest endpoint, ties broken by priority.
    fn select_endpoint(&self) -> Arc<Endpoint> {
        let mut best = &self.endpoints[0];
        let mut best_key = (best.health(), best.priority());
        for endpoint in &self.endpoints[1..] {
            let key = (endpoint.health(), endpoint.priority());
            if key < best_key {
                best = endpoint;
                best_key = key;
            }
        }
        best.clone()
    }

    async fn with_retries<T, F, Fut>(&self, method: &str, mut operation: F) -> Result<T>
    where
        F: FnMut(Arc<Endpoint>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;
            let endpoint = self.select_endpoint();
            let start = Instant::now();

            let outcome = match timeout(self.options.request_timeout, operation(endpoint.clone())).await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(AppError::timeout(method)),
            };

            match outcome {
                Ok(value) => {
                    endpoint.record_success();
                    tracing::debug!(
                        method,
                        endpoint = %endpoint.url(),
                        attempt,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "rpc call succeeded"
                    );
                    return Ok(value);
                }
                Err(err) if !err.is_retryable() => {
                    // The node answered, so the endpoint itself is fine.
                    endpoint.record_success();
                    tracing::debug!(method, endpoint = %endpoint.url(), error = %err, "rpc call rejected");
                    return Err(err);
                }
                Err(err) => {
                    endpoint.record_failure(self.options.degrade_after, self.options.unreachable_after);

                    if attempt > self.options.max_retries {
                        tracing::error!(
                            method,
                            endpoint = %endpoint.url(),
                            attempts = attempt,
                            error = %err,
                            "rpc call failed after exhausting retries"
                        );
                        return Err(exhausted(method, err));
                    }

                    let backoff = self.options.backoff_delay(attempt);
                    tracing::warn!(
                        method,
                        endpoint = %endpoint.url(),
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "rpc attempt failed; retrying"
                    );
                    sleep(backoff).await;
                }
            }
        }
    }
}

/// Callers see running out of retries as a timeout; the last connection error is kept as its cause.
fn exhausted(method: &str, err: AppError) -> AppError {
    match err {
        AppError::Timeout { .. } => err,
        other => AppError::Timeout { method: method.to_string(), cause: Some(other.to_string()) },
    }
}

impl std::fmt::Debug for RpcTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcTransport")
            .field("endpoints", &self.endpoints)
            .field("options", &self.options)
            .finish()
    }
}
