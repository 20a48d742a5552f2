//! Configuration management module.
//!
//! Handles loading configuration from environment variables.

use std::{env, str::FromStr, time::Duration};

use crate::{
    error::{AppError, Result},
    rpc::{
        options::{
            DEFAULT_INITIAL_BACKOFF_MS, DEFAULT_MAX_BACKOFF_MS, DEFAULT_MAX_RETRIES,
            DEFAULT_REQUEST_TIMEOUT_MS,
        },
        EndpointKind, TransportOptions,
    },
    subscription::SubscriptionOptions,
};

const DEFAULT_MAX_RECONNECT_ATTEMPTS: usize = 10;

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Node URLs in priority order (`http(s)://` or `ws(s)://`).
    pub nodes: Vec<String>,
    /// Websocket used for subscriptions.
    pub ws_url: Option<String>,
    /// Chain id the nodes are expected to serve.
    pub chain_id: Option<u64>,
    pub request_timeout_ms: u64,
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub max_reconnect_attempts: usize,
    /// Logging level (default: info).
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            ws_url: None,
            chain_id: None,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required environment variables:
    /// - `MM_ETH_NODES`: comma-separated node URLs, highest priority first
    ///
    /// Optional environment variables:
    /// - `MM_ETH_WS_URL`: websocket for subscriptions (default: first `ws(s)` node)
    /// - `MM_ETH_CHAIN_ID`: expected chain id
    /// - `MM_ETH_TIMEOUT_MS`: per-attempt timeout (default: 10000)
    /// - `MM_ETH_MAX_RETRIES`: retries after the first attempt (default: 4)
    /// - `MM_ETH_INITIAL_BACKOFF_MS` / `MM_ETH_MAX_BACKOFF_MS` (default: 200 / 2000)
    /// - `MM_ETH_MAX_RECONNECT_ATTEMPTS`: websocket reconnects (default: 10)
    /// - `LOG_LEVEL`: Logging level (default: info)
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        let config = Self::from_lookup(|key| env::var(key).ok())?;
        if config.nodes.is_empty() {
            return Err(AppError::Config("MM_ETH_NODES environment variable not set".into()));
        }
        Ok(config)
    }

    /// Build a configuration from an arbitrary key lookup. Node list may be empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let nodes = get("MM_ETH_NODES").map(|v| split_nodes(&v)).unwrap_or_default();
        for node in &nodes {
            EndpointKind::from_url(node)?;
        }

        let ws_url = get("MM_ETH_WS_URL");
        if let Some(url) = &ws_url {
            if EndpointKind::from_url(url)? != EndpointKind::WebSocket {
                return Err(AppError::Config(format!("MM_ETH_WS_URL must be ws:// or wss://: {url}")));
            }
        }

        Ok(Self {
            nodes,
            ws_url,
            chain_id: parse_opt(get("MM_ETH_CHAIN_ID"), "MM_ETH_CHAIN_ID")?,
            request_timeout_ms: parse_opt(get("MM_ETH_TIMEOUT_MS"), "MM_ETH_TIMEOUT_MS")?
                .unwrap_or(defaults.request_timeout_ms),
            max_retries: parse_opt(get("MM_ETH_MAX_RETRIES"), "MM_ETH_MAX_RETRIES")?
                .unwrap_or(defaults.max_retries),
            initial_backoff_ms: parse_opt(
                get("MM_ETH_INITIAL_BACKOFF_MS"),
                "MM_ETH_INITIAL_BACKOFF_MS",
            )?
            .unwrap_or(defaults.initial_backoff_ms),
            max_backoff_ms: parse_opt(get("MM_ETH_MAX_BACKOFF_MS"), "MM_ETH_MAX_BACKOFF_MS")?
                .unwrap_or(defaults.max_backoff_ms),
            max_reconnect_attempts: parse_opt(
                get("MM_ETH_MAX_RECONNECT_ATTEMPTS"),
                "MM_ETH_MAX_RECONNECT_ATTEMPTS",
            )?
            .unwrap_or(defaults.max_reconnect_attempts),
            log_level: get("LOG_LEVEL").unwrap_or(defaults.log_level),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            request_timeout: self.request_timeout(),
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            ..TransportOptions::default()
        }
    }

    pub fn subscription_options(&self) -> SubscriptionOptions {
        SubscriptionOptions {
            max_reconnect_attempts: self.max_reconnect_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }

    /// Explicit websocket URL, else the first websocket node.
    pub fn subscription_url(&self) -> Option<&str> {
        self.ws_url.as_deref().or_else(|| {
            self.nodes
                .iter()
                .map(String::as_str)
                .find(|url| EndpointKind::from_url(url).ok() == Some(EndpointKind::WebSocket))
        })
    }
}

fn split_nodes(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect()
}

fn parse_opt<T: FromStr>(value: Option<String>, key: &str) -> Result<Option<T>> {
    value
        .map(|v| {
            v.parse::<T>().map_err(|_| AppError::Config(format!("{key} is not a valid number: {v}")))
        })
        .transpose()
}
