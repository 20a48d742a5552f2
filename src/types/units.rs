//! Ether denomination helpers.

use alloy::primitives::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Ether denomination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    /// Smallest unit.
    Wei,
    /// 10^9 wei, the usual gas price unit.
    Gwei,
    /// 10^18 wei.
    #[default]
    Ether,
}

impl Unit {
    /// Number of decimals relative to wei.
    pub fn decimals(self) -> u8 {
        match self {
            Unit::Wei => 0,
            Unit::Gwei => 9,
            Unit::Ether => 18,
        }
    }

    /// Short suffix used when printing amounts.
    pub fn suffix(self) -> &'static str {
        match self {
            Unit::Wei => "wei",
            Unit::Gwei => "gwei",
            Unit::Ether => "eth",
        }
    }
}

impl std::str::FromStr for Unit {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "wei" => Ok(Unit::Wei),
            "gwei" => Ok(Unit::Gwei),
            "eth" | "ether" => Ok(Unit::Ether),
            _ => Err(AppError::Parse(format!("Invalid unit: {}", s))),
        }
    }
}

/// Format a U256 value with decimals to a human-readable string.
pub fn format_units(value: U256, decimals: u8) -> String {
    if value == U256::ZERO {
        return "0".to_string();
    }

    let value_str = value.to_string();
    let decimals = decimals as usize;

    if decimals == 0 {
        return value_str;
    }

    let len = value_str.len();
    if len <= decimals {
        let zeros = decimals - len;
        let decimal_part = value_str.trim_end_matches('0');
        format!("0.{}{}", "0".repeat(zeros), decimal_part)
    } else {
        let (integer, decimal) = value_str.split_at(len - decimals);
        let decimal = decimal.trim_end_matches('0');
        if decimal.is_empty() {
            integer.to_string()
        } else {
            format!("{}.{}", integer, decimal)
        }
    }
}

/// Parse a human-readable amount string to U256 with decimals.
///
/// Fractional digits beyond `decimals` are truncated.
pub fn parse_units(amount: &str, decimals: u8) -> Result<U256> {
    let amount = amount.trim();

    if amount.is_empty() {
        return Err(AppError::Parse("Amount cannot be empty".to_string()));
    }
    if amount.starts_with('-') {
        return Err(AppError::Parse("Amount cannot be negative".to_string()));
    }

    let decimals = decimals as usize;
    let multiplier = U256::from(10).pow(U256::from(decimals));
    let parse_part = |part: &str, label: &str| -> Result<U256> {
        if !part.chars().all(|c| c.is_ascii_digit()) {
            return Err(AppError::Parse(format!("Invalid {label}: {part}")));
        }
        part.parse::<U256>().map_err(|e| AppError::Parse(format!("Invalid {label}: {e}")))
    };

    match amount.split('.').collect::<Vec<_>>().as_slice() {
        [integer] => parse_part(integer, "amount")?
            .checked_mul(multiplier)
            .ok_or_else(|| AppError::Parse(format!("Amount too large: {amount}"))),
        [integer, fraction] => {
            let mut fraction = fraction.to_string();
            if fraction.len() > decimals {
                fraction.truncate(decimals);
            } else {
                fraction.push_str(&"0".repeat(decimals - fraction.len()));
            }

            let integer_value =
                if integer.is_empty() { U256::ZERO } else { parse_part(integer, "integer part")? };
            let fraction_value = if fraction.is_empty() {
                U256::ZERO
            } else {
                parse_part(&fraction, "fraction part")?
            };

            integer_value
                .checked_mul(multiplier)
                .and_then(|v| v.checked_add(fraction_value))
                .ok_or_else(|| AppError::Parse(format!("Amount too large: {amount}")))
        }
        _ => Err(AppError::Parse("Invalid amount format".to_string())),
    }
}

/// Parse an amount expressed in `unit` into wei.
pub fn to_wei(amount: &str, unit: Unit) -> Result<U256> {
    parse_units(amount, unit.decimals())
}

/// Render a wei amount in `unit`, rounded to `round_ndigits` fractional digits.
///
/// Values too large for `Decimal` are printed without rounding.
pub fn from_wei_str(value: U256, unit: Unit, round_ndigits: u32) -> String {
    let formatted = format_units(value, unit.decimals());
    let rendered = match formatted.parse::<Decimal>() {
        Ok(decimal) => decimal.round_dp(round_ndigits).normalize().to_string(),
        Err(_) => formatted,
    };
    format!("{}{}", rendered, unit.suffix())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_units_whole_and_fraction() {
        assert_eq!(format_units(U256::from(1_000_000_000_000_000_000u64), 18), "1");
        assert_eq!(format_units(U256::from(1_500_000u64), 6), "1.5");
        assert_eq!(format_units(U256::from(1u64), 18), "0.000000000000000001");
        assert_eq!(format_units(U256::ZERO, 18), "0");
        assert_eq!(format_units(U256::from(42u64), 0), "42");
    }

    #[test]
    fn test_parse_units_basic() {
        assert_eq!(parse_units("1.5", 18).unwrap(), U256::from(1_500_000_000_000_000_000u64));
        assert_eq!(parse_units("2", 9).unwrap(), U256::from(2_000_000_000u64));
        assert_eq!(parse_units(".5", 1).unwrap(), U256::from(5u64));
    }

    #[test]
    fn test_parse_units_truncates_extra_precision() {
        assert_eq!(parse_units("1.23456", 2).unwrap(), U256::from(123u64));
    }

    #[test]
    fn test_parse_units_rejects_garbage() {
        assert!(parse_units("", 18).is_err());
        assert!(parse_units("-1", 18).is_err());
        assert!(parse_units("1.2.3", 18).is_err());
        assert!(parse_units("abc", 18).is_err());
        assert!(parse_units("0x10", 18).is_err());
    }

    #[test]
    fn test_unit_from_str() {
        assert_eq!("ETH".parse::<Unit>().unwrap(), Unit::Ether);
        assert_eq!("ether".parse::<Unit>().unwrap(), Unit::Ether);
        assert_eq!("gwei".parse::<Unit>().unwrap(), Unit::Gwei);
        assert_eq!("wei".parse::<Unit>().unwrap(), Unit::Wei);
        assert!("finney".parse::<Unit>().is_err());
    }

    #[test]
    fn test_from_wei_str_rounds() {
        let value = U256::from(1_234_567_000_000_000_000u64);
        assert_eq!(from_wei_str(value, Unit::Ether, 2), "1.23eth");
        assert_eq!(from_wei_str(value, Unit::Ether, 5), "1.23457eth");
        assert_eq!(from_wei_str(U256::from(30_000_000_000u64), Unit::Gwei, 3), "30gwei");
    }

    #[test]
    fn test_to_wei_round_trip_with_format() {
        let wei = to_wei("0.75", Unit::Ether).unwrap();
        assert_eq!(format_units(wei, 18), "0.75");
    }
}
