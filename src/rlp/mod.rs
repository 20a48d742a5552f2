//! Recursive-length-prefix codec.
//!
//! [`RlpItem`] is the untyped tree form of RLP: byte strings and nested lists. Prefix handling
//! is delegated to [`alloy_rlp::Header`], which rejects non-canonical sizes and truncated
//! input. Scalar accessors enforce the minimal big-endian integer form.

use alloy::primitives::{Address, B256, U256};
use alloy_rlp::Header;

use crate::error::{AppError, Result};

/// Nesting bound for decoding untrusted input.
const MAX_DEPTH: usize = 1024;

/// A decoded RLP value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RlpItem {
    Bytes(Vec<u8>),
    List(Vec<RlpItem>),
}

impl RlpItem {
    /// Byte string item.
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        RlpItem::Bytes(bytes.into())
    }

    /// The empty byte string, which is also the encoding of zero.
    pub fn empty() -> Self {
        RlpItem::Bytes(Vec::new())
    }

    /// List item.
    pub fn list(items: Vec<RlpItem>) -> Self {
        RlpItem::List(items)
    }

    /// Minimal big-endian scalar.
    pub fn uint(value: U256) -> Self {
        RlpItem::Bytes(value.to_be_bytes_trimmed_vec())
    }

    pub fn u64(value: u64) -> Self {
        RlpItem::Bytes(trim_leading_zeros(&value.to_be_bytes()).to_vec())
    }

    pub fn u128(value: u128) -> Self {
        RlpItem::Bytes(trim_leading_zeros(&value.to_be_bytes()).to_vec())
    }

    /// Recipient field: 20 bytes, or empty for contract creation.
    pub fn address(address: Option<Address>) -> Self {
        match address {
            Some(address) => RlpItem::Bytes(address.to_vec()),
            None => RlpItem::empty(),
        }
    }

    pub fn as_bytes(&self) -> Result<&[u8]> {
        match self {
            RlpItem::Bytes(bytes) => Ok(bytes),
            RlpItem::List(_) => Err(malformed("expected byte string, found list")),
        }
    }

    pub fn as_list(&self) -> Result<&[RlpItem]> {
        match self {
            RlpItem::List(items) => Ok(items),
            RlpItem::Bytes(_) => Err(malformed("expected list, found byte string")),
        }
    }

    /// Scalar value; rejects leading zero bytes and values wider than 256 bits.
    pub fn as_uint(&self) -> Result<U256> {
        let bytes = self.scalar_bytes(32)?;
        Ok(U256::from_be_slice(bytes))
    }

    pub fn as_u64(&self) -> Result<u64> {
        let bytes = self.scalar_bytes(8)?;
        let mut buf = [0u8; 8];
        buf[8 - bytes.len()..].copy_from_slice(bytes);
        Ok(u64::from_be_bytes(buf))
    }

    pub fn as_u128(&self) -> Result<u128> {
        let bytes = self.scalar_bytes(16)?;
        let mut buf = [0u8; 16];
        buf[16 - bytes.len()..].copy_from_slice(bytes);
        Ok(u128::from_be_bytes(buf))
    }

    /// Recipient field; empty means contract creation.
    pub fn as_address(&self) -> Result<Option<Address>> {
        match self.as_bytes()? {
            [] => Ok(None),
            bytes if bytes.len() == 20 => Ok(Some(Address::from_slice(bytes))),
            bytes => Err(malformed(&format!("address must be 20 bytes, got {}", bytes.len()))),
        }
    }

    pub fn as_b256(&self) -> Result<B256> {
        match self.as_bytes()? {
            bytes if bytes.len() == 32 => Ok(B256::from_slice(bytes)),
            bytes => Err(malformed(&format!("hash must be 32 bytes, got {}", bytes.len()))),
        }
    }

    /// Canonical encoding of this item.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_length());
        self.encode_into(&mut out);
        out
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            RlpItem::Bytes(bytes) if bytes.len() == 1 && bytes[0] < 0x80 => out.push(bytes[0]),
            RlpItem::Bytes(bytes) => {
                Header { list: false, payload_length: bytes.len() }.encode(out);
                out.extend_from_slice(bytes);
            }
            RlpItem::List(items) => {
                Header { list: true, payload_length: self.payload_length() }.encode(out);
                for item in items {
                    item.encode_into(out);
                }
            }
        }
    }

    /// Length of the full encoding, header included.
    pub fn encoded_length(&self) -> usize {
        match self {
            RlpItem::Bytes(bytes) if bytes.len() == 1 && bytes[0] < 0x80 => 1,
            RlpItem::Bytes(bytes) => {
                Header { list: false, payload_length: bytes.len() }.length() + bytes.len()
            }
            RlpItem::List(_) => {
                let payload_length = self.payload_length();
                Header { list: true, payload_length }.length() + payload_length
            }
        }
    }

    fn payload_length(&self) -> usize {
        match self {
            RlpItem::Bytes(bytes) => bytes.len(),
            RlpItem::List(items) => items.iter().map(RlpItem::encoded_length).sum(),
        }
    }

    fn scalar_bytes(&self, max_len: usize) -> Result<&[u8]> {
        let bytes = self.as_bytes()?;
        if bytes.first() == Some(&0) {
            return Err(malformed("integer has leading zero bytes"));
        }
        if bytes.len() > max_len {
            return Err(malformed(&format!("integer wider than {max_len} bytes")));
        }
        Ok(bytes)
    }
}

/// Encode an item.
pub fn encode(item: &RlpItem) -> Vec<u8> {
    item.encode()
}

/// Decode exactly one item; trailing bytes are an error.
pub fn decode(bytes: &[u8]) -> Result<RlpItem> {
    let mut buf = bytes;
    let item = decode_item(&mut buf, 0)?;
    if !buf.is_empty() {
        return Err(malformed(&format!("{} trailing bytes after item", buf.len())));
    }
    Ok(item)
}

/// Decode one item from the front of `buf`, advancing it past the item.
pub fn decode_prefix(buf: &mut &[u8]) -> Result<RlpItem> {
    decode_item(buf, 0)
}

fn decode_item(buf: &mut &[u8], depth: usize) -> Result<RlpItem> {
    if depth > MAX_DEPTH {
        return Err(malformed("nesting too deep"));
    }

    let header = Header::decode(buf)?;
    if buf.len() < header.payload_length {
        return Err(malformed(&format!(
            "length prefix {} exceeds remaining {} bytes",
            header.payload_length,
            buf.len()
        )));
    }

    let (payload, rest) = buf.split_at(header.payload_length);
    *buf = rest;

    if !header.list {
        return Ok(RlpItem::Bytes(payload.to_vec()));
    }

    let mut inner = payload;
    let mut items = Vec::new();
    while !inner.is_empty() {
        items.push(decode_item(&mut inner, depth + 1)?);
    }
    Ok(RlpItem::List(items))
}

fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[first..]
}

fn malformed(message: &str) -> AppError {
    AppError::MalformedEncoding(message.to_string())
}
