//! JSON-RPC transport layer.
//!
//! [`RpcTransport`] spreads calls over one or more [`Endpoint`]s, retrying transport failures
//! with exponential backoff and steering away from endpoints that keep failing.

pub mod endpoint;
pub mod http;
pub mod jsonrpc;
pub mod options;
pub mod transport;

pub use endpoint::{Endpoint, EndpointHealth, EndpointKind, EndpointSnapshot, RpcConnection};
pub use http::HttpConnection;
pub use jsonrpc::{JsonRpcErrorObject, JsonRpcRequest, JsonRpcResponse};
pub use options::TransportOptions;
pub use transport::RpcTransport;
