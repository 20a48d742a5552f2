//! Unsigned transaction types and field validation.

use alloy::primitives::{keccak256, Address, Bytes, B256, U128, U256, U64};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, Result},
    rlp::RlpItem,
    types::CallRequest,
};

/// EIP-2718 transaction kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
    /// Pre-2718 transaction with a single gas price.
    Legacy,
    /// EIP-2930, type 1.
    AccessList,
    /// EIP-1559, type 2.
    #[default]
    DynamicFee,
}

impl TxType {
    /// Envelope type byte; `None` for legacy transactions.
    pub fn type_byte(self) -> Option<u8> {
        match self {
            TxType::Legacy => None,
            TxType::AccessList => Some(0x01),
            TxType::DynamicFee => Some(0x02),
        }
    }
}

/// One entry of an EIP-2930 access list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessListItem {
    pub address: Address,
    pub storage_keys: Vec<B256>,
}

impl AccessListItem {
    fn to_rlp(&self) -> RlpItem {
        RlpItem::list(vec![
            RlpItem::bytes(self.address.to_vec()),
            RlpItem::list(self.storage_keys.iter().map(|k| RlpItem::bytes(k.to_vec())).collect()),
        ])
    }

    fn from_rlp(item: &RlpItem) -> Result<Self> {
        match item.as_list()? {
            [address, keys] => {
                let address = address.as_address()?.ok_or_else(|| {
                    AppError::MalformedEncoding("access list entry without address".into())
                })?;
                let storage_keys =
                    keys.as_list()?.iter().map(RlpItem::as_b256).collect::<Result<Vec<_>>>()?;
                Ok(Self { address, storage_keys })
            }
            items => Err(AppError::MalformedEncoding(format!(
                "access list entry must have 2 fields, got {}",
                items.len()
            ))),
        }
    }
}

pub(crate) fn access_list_to_rlp(list: &[AccessListItem]) -> RlpItem {
    RlpItem::list(list.iter().map(AccessListItem::to_rlp).collect())
}

pub(crate) fn access_list_from_rlp(item: &RlpItem) -> Result<Vec<AccessListItem>> {
    item.as_list()?.iter().map(AccessListItem::from_rlp).collect()
}

/// Loose transaction fields, validated against `tx_type` by [`TransactionFields::build`].
#[derive(Debug, Clone, Default)]
pub struct TransactionFields {
    pub tx_type: TxType,
    pub chain_id: Option<u64>,
    pub nonce: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub gas_limit: u64,
    pub gas_price: Option<u128>,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
    pub input: Bytes,
    pub access_list: Option<Vec<AccessListItem>>,
}

impl TransactionFields {
    pub fn new(tx_type: TxType) -> Self {
        Self { tx_type, ..Default::default() }
    }

    pub fn chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    pub fn nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn to(mut self, to: Address) -> Self {
        self.to = Some(to);
        self
    }

    pub fn value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub fn gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    pub fn gas_price(mut self, gas_price: u128) -> Self {
        self.gas_price = Some(gas_price);
        self
    }

    pub fn max_fee_per_gas(mut self, max_fee: u128) -> Self {
        self.max_fee_per_gas = Some(max_fee);
        self
    }

    pub fn max_priority_fee_per_gas(mut self, priority_fee: u128) -> Self {
        self.max_priority_fee_per_gas = Some(priority_fee);
        self
    }

    pub fn input(mut self, input: impl Into<Bytes>) -> Self {
        self.input = input.into();
        self
    }

    pub fn access_list(mut self, access_list: Vec<AccessListItem>) -> Self {
        self.access_list = Some(access_list);
        self
    }

    /// Validate the field combination and produce a typed transaction.
    pub fn build(self) -> Result<UnsignedTransaction> {
        build(self)
    }
}

/// Validate `fields` against the schema of its declared type.
pub fn build(fields: TransactionFields) -> Result<UnsignedTransaction> {
    let TransactionFields {
        tx_type,
        chain_id,
        nonce,
        to,
        value,
        gas_limit,
        gas_price,
        max_fee_per_gas,
        max_priority_fee_per_gas,
        input,
        access_list,
    } = fields;

    match tx_type {
        TxType::Legacy => {
            reject_dynamic_fees(tx_type, max_fee_per_gas, max_priority_fee_per_gas)?;
            if access_list.is_some() {
                return Err(invalid("legacy transactions cannot carry an access list"));
            }
            let gas_price = gas_price.ok_or_else(|| invalid("legacy transaction requires gas_price"))?;
            Ok(UnsignedTransaction::Legacy(LegacyTx {
                chain_id: check_legacy_chain_id(chain_id)?,
                nonce,
                gas_price,
                gas_limit,
                to,
                value,
                input,
            }))
        }
        TxType::AccessList => {
            reject_dynamic_fees(tx_type, max_fee_per_gas, max_priority_fee_per_gas)?;
            let gas_price =
                gas_price.ok_or_else(|| invalid("access-list transaction requires gas_price"))?;
            Ok(UnsignedTransaction::AccessList(AccessListTx {
                chain_id: require_chain_id(tx_type, chain_id)?,
                nonce,
                gas_price,
                gas_limit,
                to,
                value,
                input,
                access_list: access_list.unwrap_or_default(),
            }))
        }
        TxType::DynamicFee => {
            if gas_price.is_some() {
                return Err(invalid("dynamic-fee transaction does not accept gas_price"));
            }
            let max_fee_per_gas = max_fee_per_gas
                .ok_or_else(|| invalid("dynamic-fee transaction requires max_fee_per_gas"))?;
            let max_priority_fee_per_gas = max_priority_fee_per_gas.ok_or_else(|| {
                invalid("dynamic-fee transaction requires max_priority_fee_per_gas")
            })?;
            if max_priority_fee_per_gas > max_fee_per_gas {
                return Err(invalid(&format!(
                    "max_priority_fee_per_gas ({max_priority_fee_per_gas}) exceeds max_fee_per_gas ({max_fee_per_gas})"
                )));
            }
            Ok(UnsignedTransaction::DynamicFee(DynamicFeeTx {
                chain_id: require_chain_id(tx_type, chain_id)?,
                nonce,
                max_priority_fee_per_gas,
                max_fee_per_gas,
                gas_limit,
                to,
                value,
                input,
                access_list: access_list.unwrap_or_default(),
            }))
        }
    }
}

fn reject_dynamic_fees(
    tx_type: TxType,
    max_fee: Option<u128>,
    priority_fee: Option<u128>,
) -> Result<()> {
    if max_fee.is_some() || priority_fee.is_some() {
        return Err(invalid(&format!("{tx_type:?} transaction does not accept EIP-1559 fee fields")));
    }
    Ok(())
}

fn require_chain_id(tx_type: TxType, chain_id: Option<u64>) -> Result<u64> {
    match chain_id {
        Some(0) => Err(invalid(&format!("{tx_type:?} transaction requires a non-zero chain_id"))),
        Some(id) => Ok(id),
        None => Err(invalid(&format!("{tx_type:?} transaction requires chain_id"))),
    }
}

/// Largest chain id whose EIP-155 `v = 35 + 2 * chain_id + parity` fits in a `u64`.
pub const MAX_LEGACY_CHAIN_ID: u64 = (u64::MAX - 36) / 2;

pub(crate) fn check_legacy_chain_id(chain_id: Option<u64>) -> Result<Option<u64>> {
    match chain_id {
        Some(id) if id > MAX_LEGACY_CHAIN_ID => Err(invalid(&format!(
            "legacy chain_id {id} exceeds {MAX_LEGACY_CHAIN_ID} and cannot be encoded in v"
        ))),
        other => Ok(other),
    }
}

fn invalid(message: &str) -> AppError {
    AppError::InvalidTransactionFields(message.to_string())
}

/// Legacy transaction. Without a chain id it is signed in the pre-EIP-155 form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTx {
    pub chain_id: Option<u64>,
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
}

/// EIP-2930 transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessListTx {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
    pub access_list: Vec<AccessListItem>,
}

/// EIP-1559 transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicFeeTx {
    pub chain_id: u64,
    pub nonce: u64,
    pub max_priority_fee_per_gas: u128,
    pub max_fee_per_gas: u128,
    pub gas_limit: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
    pub access_list: Vec<AccessListItem>,
}

/// A validated, unsigned transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsignedTransaction {
    Legacy(LegacyTx),
    AccessList(AccessListTx),
    DynamicFee(DynamicFeeTx),
}

impl UnsignedTransaction {
    pub fn tx_type(&self) -> TxType {
        match self {
            UnsignedTransaction::Legacy(_) => TxType::Legacy,
            UnsignedTransaction::AccessList(_) => TxType::AccessList,
            UnsignedTransaction::DynamicFee(_) => TxType::DynamicFee,
        }
    }

    pub fn chain_id(&self) -> Option<u64> {
        match self {
            UnsignedTransaction::Legacy(tx) => tx.chain_id,
            UnsignedTransaction::AccessList(tx) => Some(tx.chain_id),
            UnsignedTransaction::DynamicFee(tx) => Some(tx.chain_id),
        }
    }

    pub fn nonce(&self) -> u64 {
        match self {
            UnsignedTransaction::Legacy(tx) => tx.nonce,
            UnsignedTransaction::AccessList(tx) => tx.nonce,
            UnsignedTransaction::DynamicFee(tx) => tx.nonce,
        }
    }

    pub fn to(&self) -> Option<Address> {
        match self {
            UnsignedTransaction::Legacy(tx) => tx.to,
            UnsignedTransaction::AccessList(tx) => tx.to,
            UnsignedTransaction::DynamicFee(tx) => tx.to,
        }
    }

    pub fn value(&self) -> U256 {
        match self {
            UnsignedTransaction::Legacy(tx) => tx.value,
            UnsignedTransaction::AccessList(tx) => tx.value,
            UnsignedTransaction::DynamicFee(tx) => tx.value,
        }
    }

    pub fn gas_limit(&self) -> u64 {
        match self {
            UnsignedTransaction::Legacy(tx) => tx.gas_limit,
            UnsignedTransaction::AccessList(tx) => tx.gas_limit,
            UnsignedTransaction::DynamicFee(tx) => tx.gas_limit,
        }
    }

    pub fn input(&self) -> &Bytes {
        match self {
            UnsignedTransaction::Legacy(tx) => &tx.input,
            UnsignedTransaction::AccessList(tx) => &tx.input,
            UnsignedTransaction::DynamicFee(tx) => &tx.input,
        }
    }

    /// Re-target the transaction at another chain.
    pub fn with_chain_id(mut self, chain_id: u64) -> Result<Self> {
        match &mut self {
            UnsignedTransaction::Legacy(tx) => tx.chain_id = check_legacy_chain_id(Some(chain_id))?,
            UnsignedTransaction::AccessList(tx) => {
                tx.chain_id = require_chain_id(TxType::AccessList, Some(chain_id))?
            }
            UnsignedTransaction::DynamicFee(tx) => {
                tx.chain_id = require_chain_id(TxType::DynamicFee, Some(chain_id))?
            }
        }
        Ok(self)
    }

    /// Transaction body fields in wire order, without signature values.
    pub(crate) fn body_fields(&self) -> Vec<RlpItem> {
        match self {
            UnsignedTransaction::Legacy(tx) => vec![
                RlpItem::u64(tx.nonce),
                RlpItem::u128(tx.gas_price),
                RlpItem::u64(tx.gas_limit),
                RlpItem::address(tx.to),
                RlpItem::uint(tx.value),
                RlpItem::bytes(tx.input.to_vec()),
            ],
            UnsignedTransaction::AccessList(tx) => vec![
                RlpItem::u64(tx.chain_id),
                RlpItem::u64(tx.nonce),
                RlpItem::u128(tx.gas_price),
                RlpItem::u64(tx.gas_limit),
                RlpItem::address(tx.to),
                RlpItem::uint(tx.value),
                RlpItem::bytes(tx.input.to_vec()),
                access_list_to_rlp(&tx.access_list),
            ],
            UnsignedTransaction::DynamicFee(tx) => vec![
                RlpItem::u64(tx.chain_id),
                RlpItem::u64(tx.nonce),
                RlpItem::u128(tx.max_priority_fee_per_gas),
                RlpItem::u128(tx.max_fee_per_gas),
                RlpItem::u64(tx.gas_limit),
                RlpItem::address(tx.to),
                RlpItem::uint(tx.value),
                RlpItem::bytes(tx.input.to_vec()),
                access_list_to_rlp(&tx.access_list),
            ],
        }
    }

    /// Bytes whose keccak256 is signed.
    ///
    /// Legacy with chain id: `rlp([..body, chainId, 0, 0])` (EIP-155); without: `rlp(body)`.
    /// Typed: `type || rlp(body)`.
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut fields = self.body_fields();
        if let UnsignedTransaction::Legacy(LegacyTx { chain_id: Some(chain_id), .. }) = self {
            fields.extend([RlpItem::u64(*chain_id), RlpItem::empty(), RlpItem::empty()]);
        }

        let mut out = Vec::new();
        if let Some(type_byte) = self.tx_type().type_byte() {
            out.push(type_byte);
        }
        RlpItem::list(fields).encode_into(&mut out);
        out
    }

    pub fn signing_hash(&self) -> B256 {
        keccak256(self.signing_payload())
    }

    /// Parameters for simulating or estimating this transaction from `from`.
    pub fn to_call_request(&self, from: Address) -> CallRequest {
        let mut request = CallRequest {
            from: Some(from),
            to: self.to(),
            gas: (self.gas_limit() > 0).then(|| U64::from(self.gas_limit())),
            value: Some(self.value()),
            data: (!self.input().is_empty()).then(|| self.input().clone()),
            ..Default::default()
        };
        match self {
            UnsignedTransaction::Legacy(tx) => request.gas_price = Some(U128::from(tx.gas_price)),
            UnsignedTransaction::AccessList(tx) => {
                request.gas_price = Some(U128::from(tx.gas_price))
            }
            UnsignedTransaction::DynamicFee(tx) => {
                request.max_fee_per_gas = Some(U128::from(tx.max_fee_per_gas));
                request.max_priority_fee_per_gas = Some(U128::from(tx.max_priority_fee_per_gas));
            }
        }
        request
    }
}

/// Unsigned signing hash of `tx`.
pub fn signing_hash(tx: &UnsignedTransaction) -> B256 {
    tx.signing_hash()
}
