//! Configured node endpoints and their health tracking.

use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;

use super::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use crate::error::{AppError, Result};

/// One round-trip to a node. Implementations do not retry.
#[async_trait]
pub trait RpcConnection: Send + Sync {
    async fn send(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse>;

    async fn send_batch(&self, requests: &[JsonRpcRequest]) -> Result<Vec<JsonRpcResponse>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Http,
    WebSocket,
}

impl EndpointKind {
    pub fn from_url(url: &str) -> Result<Self> {
        let lower = url.trim().to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Ok(EndpointKind::Http)
        } else if lower.starts_with("ws://") || lower.starts_with("wss://") {
            Ok(EndpointKind::WebSocket)
        } else {
            Err(AppError::Config(format!("Unsupported node URL scheme: {url}")))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EndpointHealth {
    Healthy,
    Degraded,
    Unreachable,
}

#[derive(Debug)]
struct HealthState {
    health: EndpointHealth,
    consecutive_failures: usize,
}

/// Point-in-time copy of an endpoint's health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointSnapshot {
    pub health: EndpointHealth,
    pub consecutive_failures: usize,
}

pub struct Endpoint {
    url: String,
    kind: EndpointKind,
    priority: usize,
    connection: Arc<dyn RpcConnection>,
    state: Mutex<HealthState>,
}

impl Endpoint {
    pub fn new(
        url: impl Into<String>,
        kind: EndpointKind,
        priority: usize,
        connection: Arc<dyn RpcConnection>,
    ) -> Self {
        Self {
            url: url.into(),
            kind,
            priority,
            connection,
            state: Mutex::new(HealthState {
                health: EndpointHealth::Healthy,
                consecutive_failures: 0,
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    /// Position in the configured list; lower is preferred.
    pub fn priority(&self) -> usize {
        self.priority
    }

    pub fn connection(&self) -> &Arc<dyn RpcConnection> {
        &self.connection
    }

    pub fn health(&self) -> EndpointHealth {
        self.snapshot().health
    }

    pub fn snapshot(&self) -> EndpointSnapshot {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        EndpointSnapshot {
            health: state.health,
            consecutive_failures: state.consecutive_failures,
        }
    }

    pub(crate) fn record_success(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.consecutive_failures = 0;
        self.transition(&mut state, EndpointHealth::Healthy);
    }

    pub(crate) fn record_failure(&self, degrade_after: usize, unreachable_after: usize) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);

        let next = if state.consecutive_failures >= unreachable_after {
            EndpointHealth::Unreachable
        } else if state.consecutive_failures >= degrade_after {
            EndpointHealth::Degraded
        } else {
            state.health
        };
        self.transition(&mut state, next);
    }

    fn transition(&self, state: &mut HealthState, next: EndpointHealth) {
        if state.health != next {
            tracing::warn!(
                endpoint = %self.url,
                previous = ?state.health,
                next = ?next,
                consecutive_failures = state.consecutive_failures,
                "endpoint health changed"
            );
            state.health = next;
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("url", &self.url)
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .field("health", &self.health())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopConnection;

    #[async_trait]
    impl RpcConnection for NoopConnection {
        async fn send(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse> {
            Ok(JsonRpcResponse::success(request.id, serde_json::Value::Null))
        }

        async fn send_batch(&self, requests: &[JsonRpcRequest]) -> Result<Vec<JsonRpcResponse>> {
            Ok(requests
                .iter()
                .map(|r| JsonRpcResponse::success(r.id, serde_json::Value::Null))
                .collect())
        }
    }

    fn endpoint() -> Endpoint {
        Endpoint::new("http://localhost:8545", EndpointKind::Http, 0, Arc::new(NoopConnection))
    }

    #[test]
    fn test_kind_from_url() {
        assert_eq!(EndpointKind::from_url("https://rpc.example").unwrap(), EndpointKind::Http);
        assert_eq!(EndpointKind::from_url("WSS://rpc.example").unwrap(), EndpointKind::WebSocket);
        assert!(matches!(EndpointKind::from_url("ipc:///tmp/geth"), Err(AppError::Config(_))));
    }

    #[test]
    fn test_health_transitions() {
        let endpoint = endpoint();
        assert_eq!(endpoint.health(), EndpointHealth::Healthy);

        endpoint.record_failure(2, 4);
        assert_eq!(endpoint.health(), EndpointHealth::Healthy);
        endpoint.record_failure(2, 4);
        assert_eq!(endpoint.health(), EndpointHealth::Degraded);
        endpoint.record_failure(2, 4);
        endpoint.record_failure(2, 4);
        assert_eq!(endpoint.health(), EndpointHealth::Unreachable);
        assert_eq!(endpoint.snapshot().consecutive_failures, 4);

        endpoint.record_success();
        assert_eq!(endpoint.snapshot(), EndpointSnapshot {
            health: EndpointHealth::Healthy,
            consecutive_failures: 0,
        });
    }

    #[test]
    fn test_health_ordering() {
        assert!(EndpointHealth::Healthy < EndpointHealth::Degraded);
        assert!(EndpointHealth::Degraded < EndpointHealth::Unreachable);
    }
}
