//! JSON-RPC object types exchanged with Ethereum nodes.

use alloy::primitives::{Address, Bytes, B256, U128, U256, U64};
use serde::{Deserialize, Serialize};

/// Transaction receipt as returned by `eth_getTransactionReceipt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: B256,
    pub transaction_index: Option<U64>,
    pub block_hash: Option<B256>,
    pub block_number: Option<U64>,
    pub from: Option<Address>,
    pub to: Option<Address>,
    /// `1` for success, `0` for revert. Absent on pre-Byzantium receipts.
    pub status: Option<U64>,
    pub gas_used: U256,
    pub effective_gas_price: Option<U256>,
    pub contract_address: Option<Address>,
    #[serde(default)]
    pub logs: Vec<Log>,
}

impl Receipt {
    /// Execution outcome, if the node reported one.
    pub fn succeeded(&self) -> Option<bool> {
        self.status.map(|status| status == U64::from(1))
    }

    /// Raw status value (1 or 0).
    pub fn status_code(&self) -> Option<u64> {
        self.status.map(|status| status.to::<u64>())
    }
}

/// Event log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub address: Address,
    #[serde(default)]
    pub topics: Vec<B256>,
    #[serde(default)]
    pub data: Bytes,
    pub block_number: Option<U64>,
    pub transaction_hash: Option<B256>,
    pub log_index: Option<U64>,
    #[serde(default)]
    pub removed: bool,
}

/// Block header delivered by `newHeads` subscriptions and `eth_getBlockByNumber`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub number: U64,
    pub hash: B256,
    pub parent_hash: B256,
    pub timestamp: U64,
    pub gas_limit: Option<U64>,
    pub gas_used: Option<U64>,
    pub base_fee_per_gas: Option<U256>,
}

/// Parameters for `eth_call` and `eth_estimateGas`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas: Option<U64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<U128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<U128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<U128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,
}

impl CallRequest {
    /// Plain value transfer between two accounts.
    pub fn transfer(from: Address, to: Address, value: U256) -> Self {
        Self { from: Some(from), to: Some(to), value: Some(value), ..Default::default() }
    }
}

/// Filter for `logs` subscriptions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub address: Vec<Address>,
    /// Positional topic filters; `None` matches anything in that position.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub topics: Vec<Option<Vec<B256>>>,
}

impl LogFilter {
    /// Match logs emitted by `address`.
    pub fn address(address: Address) -> Self {
        Self { address: vec![address], topics: Vec::new() }
    }

    /// Require `topic` at position 0 (the event signature).
    pub fn event(mut self, topic: B256) -> Self {
        if self.topics.is_empty() {
            self.topics.push(Some(vec![topic]));
        } else {
            self.topics[0] = Some(vec![topic]);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;
    use serde_json::json;

    #[test]
    fn test_receipt_deserialization() {
        let raw = json!({
            "transactionHash": format!("0x{}", "11".repeat(32)),
            "transactionIndex": "0x0",
            "blockHash": format!("0x{}", "22".repeat(32)),
            "blockNumber": "0x10",
            "from": "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266",
            "to": null,
            "status": "0x1",
            "gasUsed": "0x5208",
            "effectiveGasPrice": "0x3b9aca00",
            "contractAddress": null,
            "logs": []
        });

        let receipt: Receipt = serde_json::from_value(raw).unwrap();
        assert_eq!(receipt.block_number, Some(U64::from(16)));
        assert_eq!(receipt.gas_used, U256::from(21_000u64));
        assert_eq!(receipt.succeeded(), Some(true));
        assert_eq!(receipt.status_code(), Some(1));
        assert!(receipt.to.is_none());
    }

    #[test]
    fn test_receipt_failed_status() {
        let raw = json!({
            "transactionHash": format!("0x{}", "11".repeat(32)),
            "status": "0x0",
            "gasUsed": "0x0"
        });
        let receipt: Receipt = serde_json::from_value(raw).unwrap();
        assert_eq!(receipt.succeeded(), Some(false));
        assert!(receipt.logs.is_empty());
    }

    #[test]
    fn test_call_request_serializes_hex_quantities() {
        let from = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");
        let to = address!("70997970c51812dc3a010c7d01b50e0d17dc79c8");
        let request = CallRequest::transfer(from, to, U256::ZERO);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["value"], "0x0");
        assert!(value.get("gas").is_none());
        assert!(value.get("data").is_none());
    }

    #[test]
    fn test_log_filter_serialization() {
        let addr = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
        let filter = LogFilter::address(addr).event(B256::repeat_byte(0xdd));
        let value = serde_json::to_value(&filter).unwrap();

        assert_eq!(value["address"].as_array().unwrap().len(), 1);
        assert_eq!(value["topics"][0][0], format!("0x{}", "dd".repeat(32)));
        assert_eq!(serde_json::to_value(LogFilter::default()).unwrap(), json!({}));
    }

    #[test]
    fn test_block_header_deserialization() {
        let raw = json!({
            "number": "0x1b4",
            "hash": format!("0x{}", "aa".repeat(32)),
            "parentHash": format!("0x{}", "bb".repeat(32)),
            "timestamp": "0x5f5e100",
            "baseFeePerGas": "0x7"
        });
        let header: BlockHeader = serde_json::from_value(raw).unwrap();
        assert_eq!(header.number, U64::from(436));
        assert_eq!(header.base_fee_per_gas, Some(U256::from(7u64)));
    }
}
