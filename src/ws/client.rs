//! `tokio-tungstenite` backed websocket client.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::timeout,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::{WsChannel, WsConnector, WsEvent, WsEvents};
use crate::{
    error::{AppError, Result},
    rpc::jsonrpc::{JsonRpcRequest, JsonRpcResponse},
};

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// An open websocket connection. Dropping it closes the socket.
pub struct WsClient {
    url: String,
    outgoing: mpsc::UnboundedSender<Message>,
    pending: PendingMap,
    next_id: AtomicU64,
    closed: Arc<AtomicBool>,
    request_timeout: Duration,
    tasks: Vec<JoinHandle<()>>,
}

impl WsClient {
    pub async fn connect(url: &str, request_timeout: Duration) -> Result<(Arc<Self>, WsEvents)> {
        let (stream, _response) = timeout(request_timeout, connect_async(url))
            .await
            .map_err(|_| AppError::timeout("ws_connect"))?
            .map_err(|e| AppError::Transport(format!("Websocket connect to {url} failed: {e}")))?;

        tracing::info!(ws_url = %url, "Websocket connected");

        let (mut sink, mut stream) = stream.split();
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let writer = tokio::spawn(async move {
            while let Some(message) = outgoing_rx.recv().await {
                if let Err(e) = sink.send(message).await {
                    tracing::debug!(error = %e, "Websocket write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader = {
            let pending = pending.clone();
            let closed = closed.clone();
            let outgoing = outgoing.clone();
            let url = url.to_string();
            tokio::spawn(async move {
                while let Some(frame) = stream.next().await {
                    match frame {
                        Ok(Message::Text(text)) => dispatch(&text, &pending, &events_tx),
                        Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                            Ok(text) => dispatch(text, &pending, &events_tx),
                            Err(_) => tracing::debug!("Ignoring non-UTF-8 binary frame"),
                        },
                        Ok(Message::Ping(payload)) => {
                            let _ = outgoing.send(Message::Pong(payload));
                        }
                        Ok(Message::Close(frame)) => {
                            tracing::debug!(ws_url = %url, ?frame, "Websocket closed by peer");
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!(ws_url = %url, error = %e, "Websocket read failed");
                            break;
                        }
                    }
                }

                closed.store(true, Ordering::SeqCst);
                // Dropping the senders fails every in-flight request.
                pending.lock().unwrap_or_else(PoisonError::into_inner).clear();
                let _ = events_tx.send(WsEvent::Closed);
            })
        };

        let client = Self {
            url: url.to_string(),
            outgoing,
            pending,
            next_id: AtomicU64::new(1),
            closed,
            request_timeout,
            tasks: vec![writer, reader],
        };
        Ok((Arc::new(client), events_rx))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn dispatch(
    text: &str,
    pending: &PendingMap,
    events: &mpsc::UnboundedSender<WsEvent>,
) {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring malformed websocket frame");
            return;
        }
    };

    match value {
        Value::Array(items) => items.into_iter().for_each(|item| dispatch_value(item, pending, events)),
        other => dispatch_value(other, pending, events),
    }
}

fn dispatch_value(
    value: Value,
    pending: &PendingMap,
    events: &mpsc::UnboundedSender<WsEvent>,
) {
    if value.get("method").and_then(Value::as_str) == Some("eth_subscription") {
        let params = value.get("params");
        let subscription = params.and_then(|p| p.get("subscription")).and_then(Value::as_str);
        match (subscription, params.and_then(|p| p.get("result"))) {
            (Some(subscription), Some(result)) => {
                let _ = events.send(WsEvent::Notification {
                    subscription: subscription.to_string(),
                    result: result.clone(),
                });
            }
            _ => tracing::debug!("Ignoring malformed subscription notification"),
        }
        return;
    }

    let response: JsonRpcResponse = match serde_json::from_value(value) {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring unrecognised websocket message");
            return;
        }
    };

    let sender = response
        .id
        .and_then(|id| pending.lock().unwrap_or_else(PoisonError::into_inner).remove(&id));
    match sender {
        Some(sender) => {
            let _ = sender.send(response);
        }
        None => tracing::debug!(id = ?response.id, "Discarding uncorrelated websocket response"),
    }
}

#[async_trait]
impl WsChannel for WsClient {
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        if self.is_closed() {
            return Err(AppError::Transport(format!("Websocket {} is closed", self.url)));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);
        let text = serde_json::to_string(&request)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).insert(id, tx);

        if self.outgoing.send(Message::Text(text)).is_err() {
            self.pending.lock().unwrap_or_else(PoisonError::into_inner).remove(&id);
            return Err(AppError::Transport(format!("Websocket {} is closed", self.url)));
        }

        match timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => response.into_result(),
            Ok(Err(_)) => Err(AppError::Transport(format!(
                "Websocket {} closed before responding to {method}",
                self.url
            ))),
            Err(_) => {
                self.pending.lock().unwrap_or_else(PoisonError::into_inner).remove(&id);
                Err(AppError::timeout(method))
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Connects to a fixed websocket URL.
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    url: String,
    request_timeout: Duration,
}

impl TungsteniteConnector {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Self {
        Self { url: url.into(), request_timeout }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl WsConnector for TungsteniteConnector {
    async fn connect(&self) -> Result<(Arc<dyn WsChannel>, WsEvents)> {
        let (client, events) = WsClient::connect(&self.url, self.request_timeout).await?;
        Ok((client as Arc<dyn WsChannel>, events))
    }
}
