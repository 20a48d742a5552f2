//! mm-eth
//!
//! An Ethereum node client library: RLP codec, transaction building and signing, a
//! multi-endpoint JSON-RPC transport with retry and failover, reconnecting websocket
//! subscriptions, and a typed client facade over all of them.
//!
//! # Features
//!
//! - **Transactions**: build, sign and decode legacy, EIP-2930 and EIP-1559 transactions
//! - **Transport**: per-attempt timeouts, exponential backoff, endpoint health tracking
//! - **Subscriptions**: `newHeads`, `logs` and pending-transaction streams that survive reconnects
//!
//! # Example
//!
//! ```rust,ignore
//! use mm_eth::{Config, NodeClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let client = NodeClient::from_config(&config).await?;
//!     println!("block {}", client.block_number().await?);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod rlp;
pub mod rpc;
pub mod subscription;
pub mod tx;
pub mod types;
pub mod ws;

pub use client::{FeeSuggestion, NodeClient};
pub use config::Config;
pub use error::{AppError, Result};
pub use rlp::RlpItem;
pub use rpc::{RpcTransport, TransportOptions};
pub use subscription::{
    Subscription, SubscriptionKind, SubscriptionManager, SubscriptionOptions, SubscriptionState,
};
pub use tx::{SignedTransaction, TransactionFields, TxType, UnsignedTransaction, Wallet};
