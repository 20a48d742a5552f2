//! Error types and handling module.
//!
//! Defines the crate-wide error taxonomy and conversions from library errors.

use thiserror::Error;

/// Application-wide error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Corrupt or non-canonical RLP data. Never retried.
    #[error("Malformed encoding: {0}")]
    MalformedEncoding(String),

    /// Field combination does not match the declared transaction type.
    #[error("Invalid transaction fields: {0}")]
    InvalidTransactionFields(String),

    /// Malformed key or failed signature.
    #[error("Signing error: {0}")]
    Signing(String),

    /// An RPC attempt exceeded its deadline, or every attempt failed at the connection level.
    /// `cause` carries the last connection error when there was one.
    #[error(
        "Request timed out: {method}{}",
        .cause.as_ref().map(|cause| format!(" (last error: {cause})")).unwrap_or_default()
    )]
    Timeout { method: String, cause: Option<String> },

    /// Connection-level failure (refused, reset, bad status, garbled body). Retried by the
    /// transport; callers see [`AppError::Timeout`] once retries run out.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The node rejected the request. Surfaced as-is, never retried.
    #[error("Ethereum RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The transaction was not confirmed within the allotted time.
    #[error("Receipt for {hash} not available after {waited_ms}ms")]
    ReceiptTimeout { hash: String, waited_ms: u64 },

    /// Invalid Ethereum address.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Parse error.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Subscription lifecycle errors.
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// Lower-layer error annotated with the facade operation being attempted.
    #[error("{operation} failed: {source}")]
    Operation {
        operation: &'static str,
        #[source]
        source: Box<AppError>,
    },
}

impl AppError {
    /// Deadline exceeded for `method`.
    pub fn timeout(method: impl Into<String>) -> Self {
        AppError::Timeout { method: method.into(), cause: None }
    }

    /// Wrap `self` with the name of the operation that produced it.
    pub fn context(self, operation: &'static str) -> Self {
        AppError::Operation { operation, source: Box::new(self) }
    }

    /// Innermost error, looking through any `Operation` wrappers.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::Operation { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the transport may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self.root(), AppError::Timeout { .. } | AppError::Transport(_))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Transport(err.to_string())
    }
}

impl From<alloy::signers::local::LocalSignerError> for AppError {
    fn from(err: alloy::signers::local::LocalSignerError) -> Self {
        AppError::Signing(err.to_string())
    }
}

impl From<alloy::hex::FromHexError> for AppError {
    fn from(err: alloy::hex::FromHexError) -> Self {
        AppError::Parse(err.to_string())
    }
}

impl From<std::num::ParseIntError> for AppError {
    fn from(err: std::num::ParseIntError) -> Self {
        AppError::Parse(err.to_string())
    }
}

impl From<alloy_rlp::Error> for AppError {
    fn from(err: alloy_rlp::Error) -> Self {
        AppError::MalformedEncoding(err.to_string())
    }
}

/// Result type alias using AppError.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_config_display() {
        let err = AppError::Config("MM_ETH_NODES is empty".to_string());
        assert_eq!(err.to_string(), "Configuration error: MM_ETH_NODES is empty");
    }

    #[test]
    fn test_app_error_rpc_display() {
        let err = AppError::Rpc { code: -32000, message: "nonce too low".to_string() };
        assert_eq!(err.to_string(), "Ethereum RPC error -32000: nonce too low");
    }

    #[test]
    fn test_app_error_timeout_display() {
        let err = AppError::timeout("eth_getBalance");
        assert_eq!(err.to_string(), "Request timed out: eth_getBalance");
    }

    #[test]
    fn test_app_error_timeout_with_cause_display() {
        let err = AppError::Timeout {
            method: "eth_chainId".to_string(),
            cause: Some("Transport error: connection refused".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Request timed out: eth_chainId (last error: Transport error: connection refused)"
        );
    }

    #[test]
    fn test_app_error_receipt_timeout_display() {
        let err = AppError::ReceiptTimeout { hash: "0xabc".to_string(), waited_ms: 1500 };
        assert_eq!(err.to_string(), "Receipt for 0xabc not available after 1500ms");
    }

    #[test]
    fn test_app_error_malformed_encoding_display() {
        let err = AppError::MalformedEncoding("trailing bytes".to_string());
        assert_eq!(err.to_string(), "Malformed encoding: trailing bytes");
    }

    #[test]
    fn test_operation_context_display_and_root() {
        let err = AppError::timeout("eth_chainId").context("chain_id");
        assert_eq!(err.to_string(), "chain_id failed: Request timed out: eth_chainId");
        assert!(matches!(err.root(), AppError::Timeout { .. }));
    }

    #[test]
    fn test_nested_context_root() {
        let err = AppError::Rpc { code: 3, message: "execution reverted".into() }
            .context("estimate_gas")
            .context("send_eth");
        match err.root() {
            AppError::Rpc { code, .. } => assert_eq!(*code, 3),
            other => panic!("Expected Rpc error, got {other:?}"),
        }
    }

    #[test]
    fn test_retryable_classification() {
        assert!(AppError::timeout("m").is_retryable());
        assert!(AppError::Transport("connection refused".into()).is_retryable());
        assert!(AppError::Transport("reset".into()).context("get_balance").is_retryable());
        assert!(!AppError::Rpc { code: -32000, message: "nonce too low".into() }.is_retryable());
        assert!(!AppError::MalformedEncoding("x".into()).is_retryable());
        assert!(!AppError::InvalidTransactionFields("x".into()).is_retryable());
        assert!(!AppError::Signing("x".into()).is_retryable());
    }

    #[test]
    fn test_from_parse_int_error() {
        let parse_result: std::result::Result<i32, _> = "not_a_number".parse();
        let app_err: AppError = parse_result.unwrap_err().into();

        match app_err {
            AppError::Parse(msg) => assert!(msg.contains("invalid")),
            _ => panic!("Expected Parse error"),
        }
    }

    #[test]
    fn test_from_rlp_error() {
        let err: AppError = alloy_rlp::Error::InputTooShort.into();
        assert!(matches!(err, AppError::MalformedEncoding(_)));
    }

    #[test]
    fn test_app_error_debug_trait() {
        let err = AppError::Config("test".to_string());
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("Config"));
    }
}
