use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::{sync::mpsc, task::JoinHandle, time::sleep};

use super::{SubscriptionKind, SubscriptionOptions, SubscriptionState};
use crate::{
    error::{AppError, Result},
    rpc::options::exponential_backoff,
    types::{BlockHeader, LogFilter},
    ws::{TungsteniteConnector, WsChannel, WsConnector, WsEvent, WsEvents},
};

/// Bounds on notifications buffered for ids whose `eth_subscribe` response is still in flight.
const MAX_PARKED_IDS: usize = 64;
const MAX_PARKED_PER_ID: usize = 256;

struct Entry {
    kind: SubscriptionKind,
    state: SubscriptionState,
    server_id: Option<String>,
    sink: mpsc::UnboundedSender<Value>,
}

#[derive(Default)]
struct Registry {
    entries: HashMap<u64, Entry>,
    by_server_id: HashMap<String, u64>,
    parked: HashMap<String, Vec<Value>>,
    /// Server ids released on the current connection; late notifications for them are dropped.
    released: HashSet<String>,
    channel: Option<Arc<dyn WsChannel>>,
    /// Bumped on every connection loss; ids from older connections are ignored.
    generation: u64,
    next_handle: u64,
    closed: bool,
}

impl Registry {
    fn activate(&mut self, handle: u64, server_id: &str, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        let Some(entry) = self.entries.get_mut(&handle) else {
            return false;
        };

        entry.server_id = Some(server_id.to_string());
        entry.state = SubscriptionState::Active;
        for result in self.parked.remove(server_id).unwrap_or_default() {
            let _ = entry.sink.send(result);
        }
        self.by_server_id.insert(server_id.to_string(), handle);
        true
    }

    fn deliver(&mut self, server_id: &str, result: Value) {
        if let Some(entry) = self.by_server_id.get(server_id).and_then(|h| self.entries.get(h)) {
            let _ = entry.sink.send(result);
            return;
        }
        if self.released.contains(server_id) {
            tracing::trace!(subscription = %server_id, "Dropping notification for released subscription");
            return;
        }

        if self.parked.len() >= MAX_PARKED_IDS && !self.parked.contains_key(server_id) {
            tracing::debug!(subscription = %server_id, "Dropping notification for unknown subscription");
            return;
        }
        let parked = self.parked.entry(server_id.to_string()).or_default();
        if parked.len() < MAX_PARKED_PER_ID {
            parked.push(result);
        }
    }

    fn connection_lost(&mut self) {
        self.channel = None;
        self.generation += 1;
        self.by_server_id.clear();
        self.parked.clear();
        self.released.clear();
        for entry in self.entries.values_mut() {
            entry.server_id = None;
            entry.state = SubscriptionState::Reconnecting;
        }
    }

    fn awaiting_subscribe(&self) -> Vec<(u64, SubscriptionKind)> {
        let mut pending: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.state == SubscriptionState::Reconnecting)
            .map(|(handle, entry)| (*handle, entry.kind.clone()))
            .collect();
        pending.sort_by_key(|(handle, _)| *handle);
        pending
    }

    fn remove(&mut self, handle: u64) -> Option<Entry> {
        let entry = self.entries.remove(&handle)?;
        if let Some(server_id) = &entry.server_id {
            self.by_server_id.remove(server_id);
            self.released.insert(server_id.clone());
        }
        Some(entry)
    }

    /// Terminal: drops every sink so all streams end.
    fn close_all(&mut self) {
        self.closed = true;
        self.channel = None;
        self.entries.clear();
        self.by_server_id.clear();
        self.parked.clear();
        self.released.clear();
    }
}

struct Inner {
    connector: Arc<dyn WsConnector>,
    options: SubscriptionOptions,
    registry: Mutex<Registry>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, handle: u64) {
        let (entry, channel) = {
            let mut registry = self.lock();
            (registry.remove(handle), registry.channel.clone())
        };

        if let (Some(Entry { server_id: Some(server_id), .. }), Some(channel)) = (entry, channel) {
            unsubscribe_detached(channel, server_id);
        }
    }
}

/// Owns one websocket connection and every subscription made through it.
pub struct SubscriptionManager {
    inner: Arc<Inner>,
    task: JoinHandle<()>,
}

impl SubscriptionManager {
    /// Open the initial connection and start the event loop.
    pub async fn connect(
        connector: Arc<dyn WsConnector>,
        options: SubscriptionOptions,
    ) -> Result<Self> {
        options.validate()?;
        let (channel, events) = connector.connect().await?;

        let inner = Arc::new(Inner {
            connector,
            options,
            registry: Mutex::new(Registry { channel: Some(channel), ..Default::default() }),
        });
        let task = tokio::spawn(run(inner.clone(), events));

        Ok(Self { inner, task })
    }

    pub async fn connect_url(
        url: &str,
        request_timeout: Duration,
        options: SubscriptionOptions,
    ) -> Result<Self> {
        let connector = Arc::new(TungsteniteConnector::new(url, request_timeout));
        Self::connect(connector, options).await
    }

    pub async fn subscribe(&self, kind: SubscriptionKind) -> Result<Subscription> {
        let (sink, receiver) = mpsc::unbounded_channel();

        let (handle, channel, generation) = {
            let mut registry = self.inner.lock();
            if registry.closed {
                return Err(AppError::Subscription("Subscription manager is closed".into()));
            }
            registry.next_handle += 1;
            let handle = registry.next_handle;
            let channel = registry.channel.clone();
            // Without a connection the reconnect loop picks the entry up.
            let state = if channel.is_some() {
                SubscriptionState::Pending
            } else {
                SubscriptionState::Reconnecting
            };
            registry.entries.insert(handle, Entry { kind: kind.clone(), state, server_id: None, sink });
            (handle, channel, registry.generation)
        };

        let subscription = Subscription { handle, receiver, inner: self.inner.clone() };

        if let Some(channel) = channel {
            let server_id =
                channel.request("eth_subscribe", kind.params()).await.and_then(subscription_id)?;
            let activated = self.inner.lock().activate(handle, &server_id, generation);
            if !activated {
                unsubscribe_detached(channel, server_id);
            } else {
                tracing::info!(handle, subscription = %server_id, kind = ?kind, "Subscribed");
            }
        }

        Ok(subscription)
    }

    pub async fn subscribe_new_heads(&self) -> Result<Subscription> {
        self.subscribe(SubscriptionKind::NewHeads).await
    }

    pub async fn subscribe_logs(&self, filter: LogFilter) -> Result<Subscription> {
        self.subscribe(SubscriptionKind::Logs(filter)).await
    }

    pub async fn subscribe_pending_transactions(&self) -> Result<Subscription> {
        self.subscribe(SubscriptionKind::NewPendingTransactions).await
    }

    /// Number of live local handles.
    pub fn subscription_count(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// `true` once reconnection has been exhausted.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.task.abort();
        self.inner.lock().close_all();
    }
}

impl std::fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.inner.lock();
        f.debug_struct("SubscriptionManager")
            .field("subscriptions", &registry.entries.len())
            .field("connected", &registry.channel.is_some())
            .field("closed", &registry.closed)
            .finish()
    }
}

/// Consumer side of one subscription. Dropping it unsubscribes.
pub struct Subscription {
    handle: u64,
    receiver: mpsc::UnboundedReceiver<Value>,
    inner: Arc<Inner>,
}

impl Subscription {
    /// Local handle, stable across reconnects.
    pub fn id(&self) -> u64 {
        self.handle
    }

    pub fn state(&self) -> SubscriptionState {
        self.inner
            .lock()
            .entries
            .get(&self.handle)
            .map(|entry| entry.state)
            .unwrap_or(SubscriptionState::Closed)
    }

    /// Next notification payload, or `None` once the subscription is closed.
    pub async fn next(&mut self) -> Option<Value> {
        self.receiver.recv().await
    }

    /// [`Self::next`], deserialized.
    pub async fn next_as<T: DeserializeOwned>(&mut self) -> Option<Result<T>> {
        let value = self.next().await?;
        Some(serde_json::from_value(value).map_err(|e| {
            AppError::Parse(format!("Unexpected subscription payload: {e}"))
        }))
    }

    /// Next block header of a `newHeads` subscription.
    pub async fn next_header(&mut self) -> Option<Result<BlockHeader>> {
        self.next_as().await
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.inner.release(self.handle);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.handle)
            .field("state", &self.state())
            .finish()
    }
}

fn subscription_id(result: Value) -> Result<String> {
    match result {
        Value::String(id) => Ok(id),
        other => Err(AppError::Subscription(format!("Unexpected eth_subscribe result: {other}"))),
    }
}

fn unsubscribe_detached(channel: Arc<dyn WsChannel>, server_id: String) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        return;
    };
    runtime.spawn(async move {
        if let Err(e) = channel.request("eth_unsubscribe", json!([server_id])).await {
            tracing::debug!(subscription = %server_id, error = %e, "eth_unsubscribe failed");
        }
    });
}

async fn run(inner: Arc<Inner>, mut events: WsEvents) {
    loop {
        while let Some(event) = events.recv().await {
            match event {
                WsEvent::Notification { subscription, result } => {
                    inner.lock().deliver(&subscription, result)
                }
                WsEvent::Closed => break,
            }
        }

        let live = {
            let mut registry = inner.lock();
            registry.connection_lost();
            registry.entries.len()
        };
        tracing::warn!(subscriptions = live, "Subscription connection lost; reconnecting");

        match reconnect(&inner).await {
            Some(next) => events = next,
            None => {
                tracing::error!(
                    attempts = inner.options.max_reconnect_attempts,
                    "Subscription reconnect exhausted; closing all subscriptions"
                );
                inner.lock().close_all();
                return;
            }
        }
    }
}

async fn reconnect(inner: &Inner) -> Option<WsEvents> {
    for attempt in 1..=inner.options.max_reconnect_attempts {
        sleep(exponential_backoff(inner.options.initial_backoff, inner.options.max_backoff, attempt))
            .await;

        let (channel, events) = match inner.connector.connect().await {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!(attempt, error = %e, "Subscription reconnect attempt failed");
                continue;
            }
        };

        let (generation, pending) = {
            let mut registry = inner.lock();
            registry.channel = Some(channel.clone());
            (registry.generation, registry.awaiting_subscribe())
        };

        match resubscribe(inner, &channel, generation, pending).await {
            Ok(count) => {
                tracing::info!(attempt, resubscribed = count, "Subscription connection restored");
                return Some(events);
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "Re-subscribing failed");
                inner.lock().connection_lost();
            }
        }
    }
    None
}

async fn resubscribe(
    inner: &Inner,
    channel: &Arc<dyn WsChannel>,
    generation: u64,
    pending: Vec<(u64, SubscriptionKind)>,
) -> Result<usize> {
    let mut count = 0;
    for (handle, kind) in pending {
        match channel.request("eth_subscribe", kind.params()).await.and_then(subscription_id) {
            Ok(server_id) => {
                let activated = inner.lock().activate(handle, &server_id, generation);
                if activated {
                    count += 1;
                } else {
                    unsubscribe_detached(channel.clone(), server_id);
                }
            }
            Err(e) if e.is_retryable() => return Err(e),
            Err(e) => {
                tracing::warn!(handle, error = %e, "Re-subscription rejected; closing subscription");
                inner.lock().remove(handle);
            }
        }
    }
    Ok(count)
}
