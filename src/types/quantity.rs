//! Wire-format helpers for JSON-RPC quantities, hashes and addresses.

use alloy::primitives::{Address, B256, U256};

use crate::error::{AppError, Result};

/// Encode an integer as a JSON-RPC quantity: `0x`-prefixed, no leading zeros, zero is `0x0`.
pub fn to_quantity<T: std::fmt::LowerHex>(value: T) -> String {
    format!("{value:#x}")
}

/// Parse a JSON-RPC quantity into a U256.
pub fn parse_quantity(s: &str) -> Result<U256> {
    let digits = strip_hex_prefix(s.trim())
        .ok_or_else(|| AppError::Parse(format!("Quantity must start with '0x': {s}")))?;
    if digits.is_empty() {
        return Err(AppError::Parse(format!("Empty quantity: {s}")));
    }
    U256::from_str_radix(digits, 16).map_err(|e| AppError::Parse(format!("Invalid quantity {s}: {e}")))
}

/// Parse a JSON-RPC quantity that must fit in 64 bits.
pub fn parse_u64_quantity(s: &str) -> Result<u64> {
    let value = parse_quantity(s)?;
    u64::try_from(value).map_err(|_| AppError::Parse(format!("Quantity exceeds u64: {s}")))
}

/// Parse and validate an Ethereum address.
///
/// All-lowercase and all-uppercase forms are accepted as-is; mixed case must carry a valid
/// EIP-55 checksum.
pub fn parse_address(s: &str) -> Result<Address> {
    let trimmed = s.trim();

    if trimmed.is_empty() {
        return Err(AppError::InvalidAddress("Address cannot be empty".into()));
    }

    let digits = strip_hex_prefix(trimmed)
        .ok_or_else(|| AppError::InvalidAddress(format!("Address must start with '0x': {s}")))?;

    if digits.len() != 40 {
        return Err(AppError::InvalidAddress(format!(
            "Address must be 42 characters (0x + 40 hex chars), got {}: {}",
            trimmed.len(),
            s
        )));
    }

    let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());

    if has_lower && has_upper {
        let normalized = format!("0x{digits}");
        return Address::parse_checksummed(&normalized, None)
            .map_err(|_| AppError::InvalidAddress(format!("Bad EIP-55 checksum: {s}")));
    }

    digits
        .parse::<Address>()
        .map_err(|e| AppError::InvalidAddress(format!("Invalid address format '{}': {}", s, e)))
}

/// Parse a 32-byte hash.
pub fn parse_hash(s: &str) -> Result<B256> {
    let trimmed = s.trim();
    let digits = strip_hex_prefix(trimmed)
        .ok_or_else(|| AppError::Parse(format!("Hash must start with '0x': {s}")))?;
    if digits.len() != 64 {
        return Err(AppError::Parse(format!("Hash must be 32 bytes: {s}")));
    }
    digits.parse::<B256>().map_err(|e| AppError::Parse(format!("Invalid hash {s}: {e}")))
}

/// Decode `0x`-prefixed (or bare) hex into bytes.
pub fn parse_hex_bytes(s: &str) -> Result<Vec<u8>> {
    let trimmed = s.trim();
    let digits = strip_hex_prefix(trimmed).unwrap_or(trimmed);
    Ok(alloy::hex::decode(digits)?)
}

fn strip_hex_prefix(s: &str) -> Option<&str> {
    s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))
}
