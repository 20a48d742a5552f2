//! JSON-RPC 2.0 envelopes and response correlation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        let params = match params {
            Value::Null => Value::Array(Vec::new()),
            other => other,
        };
        Self { jsonrpc: "2.0", id, method: method.into(), params }
    }
}

/// Error object of a failed call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// `None` only for malformed responses; they never correlate.
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorObject>,
}

impl JsonRpcResponse {
    pub fn success(id: u64, result: Value) -> Self {
        Self { id: Some(id), result, error: None }
    }

    pub fn failure(id: u64, code: i64, message: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            result: Value::Null,
            error: Some(JsonRpcErrorObject { code, message: message.into(), data: None }),
        }
    }

    /// The result value, or the node's error as [`AppError::Rpc`].
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(error) => {
                let message = match error.data {
                    Some(Value::String(data)) if !data.is_empty() => {
                        format!("{} ({data})", error.message)
                    }
                    _ => error.message,
                };
                Err(AppError::Rpc { code: error.code, message })
            }
            None => Ok(self.result),
        }
    }
}

/// Match `responses` to the request `ids`, preserving request order.
///
/// Responses with an id not in `ids` are discarded. A request without a response yields a
/// transport error in its slot.
pub fn correlate(ids: &[u64], responses: Vec<JsonRpcResponse>) -> Vec<Result<Value>> {
    let mut by_id: HashMap<u64, JsonRpcResponse> = HashMap::with_capacity(responses.len());
    for response in responses {
        match response.id {
            Some(id) if ids.contains(&id) => {
                by_id.entry(id).or_insert(response);
            }
            other => tracing::debug!(id = ?other, "Discarding uncorrelated JSON-RPC response"),
        }
    }

    ids.iter()
        .map(|id| match by_id.remove(id) {
            Some(response) => response.into_result(),
            None => Err(AppError::Transport(format!("No response for request id {id}"))),
        })
        .collect()
}
