//! JSON-RPC over HTTP POST.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use super::{
    endpoint::RpcConnection,
    jsonrpc::{JsonRpcRequest, JsonRpcResponse},
};
use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct HttpConnection {
    client: Client,
    url: String,
}

impl HttpConnection {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, url: url.into() })
    }

    async fn post<B, T>(&self, method: &str, body: &B) -> Result<T>
    where
        B: serde::Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| map_reqwest_error(method, e))?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::Transport(format!("HTTP {status} from {}", self.url)));
        }

        let bytes = response.bytes().await.map_err(|e| map_reqwest_error(method, e))?;

        // Some nodes answer RPC errors with a 4xx status and a valid JSON-RPC body.
        serde_json::from_slice(&bytes).map_err(|e| {
            if status.is_success() {
                AppError::Transport(format!("Malformed JSON-RPC response from {}: {e}", self.url))
            } else {
                AppError::Transport(format!("HTTP {status} from {}", self.url))
            }
        })
    }
}

#[async_trait]
impl RpcConnection for HttpConnection {
    async fn send(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse> {
        self.post(&request.method, request).await
    }

    async fn send_batch(&self, requests: &[JsonRpcRequest]) -> Result<Vec<JsonRpcResponse>> {
        self.post("batch", requests).await
    }
}

fn map_reqwest_error(method: &str, err: reqwest::Error) -> AppError {
    if err.is_timeout() {
        AppError::timeout(method)
    } else {
        err.into()
    }
}
