//! Type definitions module.
//!
//! Shared value types: wire quantities, RPC objects and ether units.

pub mod quantity;
pub mod rpc;
pub mod units;

pub use quantity::*;
pub use rpc::*;
pub use units::*;
