//! Request/response transport over a lazily (re)opened websocket.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::Mutex;

use super::{WsChannel, WsConnector};
use crate::{
    error::{AppError, Result},
    rpc::{
        endpoint::RpcConnection,
        jsonrpc::{JsonRpcRequest, JsonRpcResponse},
    },
};

/// Uses a websocket endpoint for plain calls. Notifications are ignored.
pub struct WsRpcConnection {
    connector: Arc<dyn WsConnector>,
    channel: Mutex<Option<Arc<dyn WsChannel>>>,
}

impl WsRpcConnection {
    pub fn new(connector: Arc<dyn WsConnector>) -> Self {
        Self { connector, channel: Mutex::new(None) }
    }

    async fn channel(&self) -> Result<Arc<dyn WsChannel>> {
        let mut guard = self.channel.lock().await;
        if let Some(channel) = guard.as_ref().filter(|channel| !channel.is_closed()) {
            return Ok(channel.clone());
        }

        let (channel, _events) = self.connector.connect().await?;
        *guard = Some(channel.clone());
        Ok(channel)
    }
}

#[async_trait]
impl RpcConnection for WsRpcConnection {
    async fn send(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse> {
        let channel = self.channel().await?;
        match channel.request(&request.method, request.params.clone()).await {
            Ok(result) => Ok(JsonRpcResponse::success(request.id, result)),
            Err(AppError::Rpc { code, message }) => {
                Ok(JsonRpcResponse::failure(request.id, code, message))
            }
            Err(e) => Err(e),
        }
    }

    async fn send_batch(&self, requests: &[JsonRpcRequest]) -> Result<Vec<JsonRpcResponse>> {
        let responses = join_all(requests.iter().map(|request| self.send(request))).await;
        responses.into_iter().collect()
    }
}
