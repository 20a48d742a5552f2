//! Node client facade.
//!
//! [`NodeClient`] exposes typed Ethereum operations over an [`RpcTransport`] and, when a
//! websocket is configured, a [`SubscriptionManager`]. Errors from lower layers come back
//! wrapped in [`AppError::Operation`] naming the operation; [`AppError::root`] reaches the
//! original kind.

use std::{sync::Arc, time::Duration};

use alloy::primitives::{Address, Bytes, B256, U128, U256, U64};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::{
    sync::OnceCell,
    time::{sleep, timeout_at, Instant},
};

use crate::{
    config::Config,
    error::{AppError, Result},
    rpc::RpcTransport,
    subscription::{Subscription, SubscriptionManager},
    tx::{SignedTransaction, UnsignedTransaction, Wallet},
    types::{BlockHeader, CallRequest, LogFilter, Receipt},
};

/// Suggested EIP-1559 fee caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSuggestion {
    pub base_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub max_fee_per_gas: u128,
}

/// Ethereum node client.
#[derive(Clone)]
pub struct NodeClient {
    transport: Arc<RpcTransport>,
    subscriptions: Option<Arc<SubscriptionManager>>,
    /// Fetched once, then served from memory.
    chain_id: Arc<OnceCell<u64>>,
}

impl NodeClient {
    /// Create a client over `transport`. No network calls are made here.
    pub fn new(transport: RpcTransport) -> Self {
        Self { transport: Arc::new(transport), subscriptions: None, chain_id: Arc::new(OnceCell::new()) }
    }

    /// Attach a subscription manager for `subscribe_*` and head-driven receipt waiting.
    pub fn with_subscriptions(mut self, manager: SubscriptionManager) -> Self {
        self.subscriptions = Some(Arc::new(manager));
        self
    }

    /// Build the transport from `config` and connect the websocket, if one is configured.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let transport = RpcTransport::from_urls(&config.nodes, config.transport_options())?;
        let client = Self::new(transport);

        match config.subscription_url() {
            Some(url) => {
                let manager = SubscriptionManager::connect_url(
                    url,
                    config.request_timeout(),
                    config.subscription_options(),
                )
                .await
                .map_err(|e| e.context("connect_websocket"))?;
                tracing::info!(ws_url = %url, "Subscriptions enabled");
                Ok(client.with_subscriptions(manager))
            }
            None => Ok(client),
        }
    }

    pub fn transport(&self) -> &RpcTransport {
        &self.transport
    }

    pub fn subscriptions(&self) -> Option<&SubscriptionManager> {
        self.subscriptions.as_deref()
    }

    async fn request<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        method: &str,
        params: Value,
    ) -> Result<T> {
        self.transport.call_as(method, params).await.map_err(|e| e.context(operation))
    }

    /// Chain id (fetched from the node on first call).
    pub async fn chain_id(&self) -> Result<u64> {
        self.chain_id
            .get_or_try_init(|| async {
                let chain_id: U64 = self.request("chain_id", "eth_chainId", json!([])).await?;
                let chain_id = chain_id.to::<u64>();
                tracing::info!(chain_id, "Connected to Ethereum node");
                Ok(chain_id)
            })
            .await
            .copied()
    }

    /// Fail unless the node serves `expected`.
    pub async fn check_chain_id(&self, expected: u64) -> Result<()> {
        let actual = self.chain_id().await?;
        if actual != expected {
            return Err(AppError::Config(format!(
                "Node reports chain id {actual}, expected {expected}"
            ))
            .context("check_chain_id"));
        }
        Ok(())
    }

    pub async fn block_number(&self) -> Result<u64> {
        let number: U64 = self.request("block_number", "eth_blockNumber", json!([])).await?;
        Ok(number.to::<u64>())
    }

    pub async fn latest_block(&self) -> Result<BlockHeader> {
        let block: Option<BlockHeader> = self
            .request("latest_block", "eth_getBlockByNumber", json!(["latest", false]))
            .await?;
        block.ok_or_else(|| {
            AppError::Parse("Node returned no latest block".into()).context("latest_block")
        })
    }

    pub async fn gas_price(&self) -> Result<u128> {
        let price: U128 = self.request("gas_price", "eth_gasPrice", json!([])).await?;
        Ok(price.to::<u128>())
    }

    pub async fn max_priority_fee(&self) -> Result<u128> {
        let fee: U128 =
            self.request("max_priority_fee", "eth_maxPriorityFeePerGas", json!([])).await?;
        Ok(fee.to::<u128>())
    }

    /// Base fee of the latest block.
    pub async fn base_fee(&self) -> Result<u128> {
        let block = self.latest_block().await.map_err(|e| e.context("base_fee"))?;
        let base_fee = block.base_fee_per_gas.ok_or_else(|| {
            AppError::Parse("Latest block has no base fee (pre-London chain)".into())
                .context("base_fee")
        })?;
        u128::try_from(base_fee).map_err(|_| {
            AppError::Parse(format!("Base fee {base_fee} exceeds 128 bits")).context("base_fee")
        })
    }

    /// Fee caps for a dynamic-fee transaction: `2 · base fee + priority fee`.
    pub async fn suggest_fees(&self) -> Result<FeeSuggestion> {
        let (base_fee, priority_fee) = tokio::try_join!(self.base_fee(), self.max_priority_fee())?;
        Ok(FeeSuggestion {
            base_fee_per_gas: base_fee,
            max_priority_fee_per_gas: priority_fee,
            max_fee_per_gas: base_fee.saturating_mul(2).saturating_add(priority_fee),
        })
    }

    pub async fn get_balance(&self, address: Address) -> Result<U256> {
        self.request("get_balance", "eth_getBalance", json!([address, "latest"])).await
    }

    pub async fn get_transaction_count(&self, address: Address) -> Result<u64> {
        let count: U64 = self
            .request("get_transaction_count", "eth_getTransactionCount", json!([address, "latest"]))
            .await?;
        Ok(count.to::<u64>())
    }

    pub async fn estimate_gas(&self, call: &CallRequest) -> Result<u64> {
        let gas: U64 = self.request("estimate_gas", "eth_estimateGas", json!([call])).await?;
        Ok(gas.to::<u64>())
    }

    pub async fn call(&self, call: &CallRequest) -> Result<Bytes> {
        self.request("call", "eth_call", json!([call, "latest"])).await
    }

    /// Broadcast a signed transaction and return its hash.
    ///
    /// Rebroadcasting the same bytes is safe: a node that already holds the transaction is
    /// treated as having accepted it, since an earlier attempt may have landed before its
    /// response was lost.
    pub async fn send_raw_transaction(&self, signed: &SignedTransaction) -> Result<B256> {
        let local_hash = signed.hash();
        let sent: Result<B256> = self
            .request("send_raw_transaction", "eth_sendRawTransaction", json!([signed.encode_hex()]))
            .await;

        let hash = match sent {
            Ok(hash) => {
                if hash != local_hash {
                    tracing::warn!(node_hash = %hash, local_hash = %local_hash, "Node returned an unexpected transaction hash");
                }
                hash
            }
            Err(err) => match broadcast_rejection(&err) {
                Some(Rejection::AlreadyKnown) => {
                    tracing::info!(tx_hash = %local_hash, error = %err.root(), "Transaction already known to node");
                    local_hash
                }
                Some(Rejection::NonceTooLow) => {
                    if !self.node_has_transaction(local_hash).await {
                        return Err(err);
                    }
                    tracing::info!(tx_hash = %local_hash, "Nonce already used by this transaction");
                    local_hash
                }
                None => return Err(err),
            },
        };
        tracing::info!(tx_hash = %hash, "Transaction submitted");
        Ok(hash)
    }

    async fn node_has_transaction(&self, hash: B256) -> bool {
        let found: Result<Option<Value>> = self
            .request("get_transaction_by_hash", "eth_getTransactionByHash", json!([hash]))
            .await;
        match found {
            Ok(transaction) => transaction.is_some(),
            Err(e) => {
                tracing::debug!(tx_hash = %hash, error = %e, "Transaction lookup failed");
                false
            }
        }
    }

    pub async fn get_transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>> {
        self.request("get_transaction_receipt", "eth_getTransactionReceipt", json!([hash])).await
    }

    /// Receipt status: `Some(1)` success, `Some(0)` reverted, `None` while pending.
    pub async fn get_tx_status(&self, hash: B256) -> Result<Option<u64>> {
        let receipt =
            self.get_transaction_receipt(hash).await.map_err(|e| e.context("get_tx_status"))?;
        Ok(receipt.and_then(|receipt| receipt.status_code()))
    }

    /// Poll for the receipt of `hash` until it exists or `timeout` elapses.
    ///
    /// With a subscription manager attached, every new block header also triggers a poll.
    pub async fn wait_for_receipt(
        &self,
        hash: B256,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<Receipt> {
        let started = Instant::now();
        let deadline = started + timeout;

        let receipt_timeout = || AppError::ReceiptTimeout {
            hash: hash.to_string(),
            waited_ms: started.elapsed().as_millis() as u64,
        };

        let mut heads = match &self.subscriptions {
            Some(manager) => match timeout_at(deadline, manager.subscribe_new_heads()).await {
                Ok(Ok(subscription)) => Some(subscription),
                Ok(Err(e)) => {
                    tracing::debug!(error = %e, "Falling back to polling only");
                    None
                }
                Err(_) => return Err(receipt_timeout()),
            },
            None => None,
        };

        loop {
            // Each poll is cut off at the caller's deadline, whatever the transport's own retry budget.
            match timeout_at(deadline, self.get_transaction_receipt(hash)).await {
                Ok(Ok(Some(receipt))) => {
                    tracing::debug!(
                        tx_hash = %hash,
                        waited_ms = started.elapsed().as_millis() as u64,
                        "Receipt available"
                    );
                    return Ok(receipt);
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) if e.is_retryable() => {
                    tracing::warn!(tx_hash = %hash, error = %e, "Receipt poll failed; will retry");
                }
                Ok(Err(e)) => return Err(e.context("wait_for_receipt")),
                Err(_) => return Err(receipt_timeout()),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(receipt_timeout());
            }

            let wait = poll_interval.min(deadline - now);
            let heads_closed = match heads.as_mut() {
                Some(subscription) => tokio::select! {
                    _ = sleep(wait) => false,
                    head = subscription.next() => head.is_none(),
                },
                None => {
                    sleep(wait).await;
                    false
                }
            };
            if heads_closed {
                heads = None;
            }
        }
    }

    pub async fn subscribe_new_heads(&self) -> Result<Subscription> {
        self.subscription_manager("subscribe_new_heads")?
            .subscribe_new_heads()
            .await
            .map_err(|e| e.context("subscribe_new_heads"))
    }

    pub async fn subscribe_logs(&self, filter: LogFilter) -> Result<Subscription> {
        self.subscription_manager("subscribe_logs")?
            .subscribe_logs(filter)
            .await
            .map_err(|e| e.context("subscribe_logs"))
    }

    fn subscription_manager(&self, operation: &'static str) -> Result<&SubscriptionManager> {
        self.subscriptions.as_deref().ok_or_else(|| {
            AppError::Subscription("No websocket endpoint configured".into()).context(operation)
        })
    }

    /// Sign `tx` with `wallet` and broadcast it. The transaction must target the node's chain.
    pub async fn sign_and_send(&self, tx: UnsignedTransaction, wallet: &Wallet) -> Result<B256> {
        let chain_id = self.chain_id().await.map_err(|e| e.context("sign_and_send"))?;
        if let Some(tx_chain_id) = tx.chain_id() {
            if tx_chain_id != chain_id {
                return Err(AppError::InvalidTransactionFields(format!(
                    "Transaction targets chain {tx_chain_id}, node serves {chain_id}"
                ))
                .context("sign_and_send"));
            }
        }

        let signed = wallet.sign_transaction(tx).map_err(|e| e.context("sign_and_send"))?;
        self.send_raw_transaction(&signed).await.map_err(|e| e.context("sign_and_send"))
    }
}

/// Node answers to a rebroadcast that may mean an earlier attempt already landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    AlreadyKnown,
    NonceTooLow,
}

fn broadcast_rejection(err: &AppError) -> Option<Rejection> {
    let AppError::Rpc { message, .. } = err.root() else {
        return None;
    };
    let message = message.to_ascii_lowercase();
    if message.contains("already known") || message.contains("known transaction") {
        Some(Rejection::AlreadyKnown)
    } else if message.contains("nonce too low") {
        Some(Rejection::NonceTooLow)
    } else {
        None
    }
}

impl std::fmt::Debug for NodeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeClient")
            .field("transport", &self.transport)
            .field("subscriptions", &self.subscriptions.is_some())
            .field("chain_id", &self.chain_id.get())
            .finish()
    }
}
