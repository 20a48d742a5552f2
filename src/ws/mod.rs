//! Websocket JSON-RPC plumbing.
//!
//! A [`WsConnector`] opens a [`WsChannel`] for request/response traffic plus an event stream
//! carrying `eth_subscription` notifications and the final [`WsEvent::Closed`].

pub mod client;
pub mod connection;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::Result;

pub use client::{TungsteniteConnector, WsClient};
pub use connection::WsRpcConnection;

/// Out-of-band traffic from a websocket connection.
#[derive(Debug, Clone, PartialEq)]
pub enum WsEvent {
    Notification { subscription: String, result: Value },
    /// The connection is gone; no further events follow.
    Closed,
}

/// Request/response half of an open websocket connection.
#[async_trait]
pub trait WsChannel: Send + Sync {
    /// Issue one request and wait for its correlated response.
    async fn request(&self, method: &str, params: Value) -> Result<Value>;

    fn is_closed(&self) -> bool;
}

pub type WsEvents = mpsc::UnboundedReceiver<WsEvent>;

/// Opens websocket connections.
#[async_trait]
pub trait WsConnector: Send + Sync {
    async fn connect(&self) -> Result<(Arc<dyn WsChannel>, WsEvents)>;
}
