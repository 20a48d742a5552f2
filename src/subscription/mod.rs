//! Websocket subscriptions that survive reconnects.
//!
//! Each [`Subscription`] is a stable local handle. The node-assigned id behind it may change
//! when the [`SubscriptionManager`] re-establishes its connection; consumers only observe a
//! possible gap in delivery.

mod manager;

use std::time::Duration;

use serde_json::{json, Value};

use crate::{
    error::{AppError, Result},
    types::LogFilter,
};

pub use manager::{Subscription, SubscriptionManager};

/// What a subscription listens to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionKind {
    NewHeads,
    Logs(LogFilter),
    NewPendingTransactions,
}

impl SubscriptionKind {
    /// `eth_subscribe` parameters.
    pub fn params(&self) -> Value {
        match self {
            SubscriptionKind::NewHeads => json!(["newHeads"]),
            SubscriptionKind::Logs(filter) => json!(["logs", filter]),
            SubscriptionKind::NewPendingTransactions => json!(["newPendingTransactions"]),
        }
    }
}

/// Lifecycle of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// `eth_subscribe` has not been acknowledged yet.
    Pending,
    Active,
    /// The connection dropped; waiting to be re-subscribed.
    Reconnecting,
    /// Terminal. The stream has ended.
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionOptions {
    /// Reconnect attempts after a connection loss before every subscription is closed.
    pub max_reconnect_attempts: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 10,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl SubscriptionOptions {
    pub fn validate(&self) -> Result<()> {
        if self.initial_backoff.is_zero() {
            return Err(AppError::Config("initial_backoff must be greater than 0".into()));
        }
        if self.max_backoff < self.initial_backoff {
            return Err(AppError::Config(
                "max_backoff must not be smaller than initial_backoff".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, B256};

    #[test]
    fn test_subscribe_params() {
        assert_eq!(SubscriptionKind::NewHeads.params(), json!(["newHeads"]));
        assert_eq!(
            SubscriptionKind::NewPendingTransactions.params(),
            json!(["newPendingTransactions"])
        );

        let filter = LogFilter::address(address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"))
            .event(B256::repeat_byte(0x11));
        let params = SubscriptionKind::Logs(filter).params();
        assert_eq!(params[0], "logs");
        assert_eq!(
            params[1]["address"][0].as_str().unwrap().to_lowercase(),
            "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"
        );
    }

    #[test]
    fn test_options_validation() {
        assert!(SubscriptionOptions::default().validate().is_ok());
        let bad = SubscriptionOptions { initial_backoff: Duration::ZERO, ..Default::default() };
        assert!(bad.validate().is_err());
    }
}
