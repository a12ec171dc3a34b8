//! DomainUint256 - U256 wrapper used for agent ids, expiries and nonces
//!
//! Accepts on the wire:
//! - Decimal strings: "331157" -> U256(331157)
//! - Hex strings with 0x prefix: "0x50d95" -> U256(331157)
//! - JSON integers: 331157 -> U256(331157)
//!
//! Always serializes as a decimal string, since agent ids are unbounded and
//! JavaScript clients cannot hold them in a number.
//!
//! ethers' `U256::from_str` treats every string as hex, so "42" would silently
//! become 0x42 = 66. Parsing goes through [`parse_uint256`] instead.

use ethers::types::U256;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default)]
pub struct DomainUint256(pub U256);

/// Parse a decimal or `0x`-prefixed hex string into a U256.
pub fn parse_uint256(value: &str) -> Result<U256, String> {
    let cleaned = value.trim().trim_matches('"');
    if cleaned.is_empty() {
        return Err("empty numeric value".to_string());
    }

    if let Some(hex_part) = cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        U256::from_str_radix(hex_part, 16)
            .map_err(|e| format!("Failed to parse hex: {} for value {}", e, cleaned))
    } else {
        U256::from_dec_str(cleaned)
            .map_err(|e| format!("Failed to parse decimal: {} for value {}", e, cleaned))
    }
}

impl fmt::Display for DomainUint256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DomainUint256 {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_uint256(s).map(Self)
    }
}

impl Serialize for DomainUint256 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for DomainUint256 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DomainUint256Visitor;

        impl<'de> Visitor<'de> for DomainUint256Visitor {
            type Value = DomainUint256;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an unsigned integer, or a decimal / 0x-hex string")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                parse_uint256(value).map(DomainUint256).map_err(de::Error::custom)
            }

            fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                self.visit_str(&value)
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(DomainUint256(U256::from(value)))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                if value < 0 {
                    Err(de::Error::custom("negative value cannot be converted to U256"))
                } else {
                    Ok(DomainUint256(U256::from(value as u64)))
                }
            }
        }

        deserializer.deserialize_any(DomainUint256Visitor)
    }
}

impl From<U256> for DomainUint256 {
    fn from(input: U256) -> Self {
        Self(input)
    }
}

impl From<u64> for DomainUint256 {
    fn from(input: u64) -> Self {
        Self(U256::from(input))
    }
}

impl From<DomainUint256> for U256 {
    fn from(input: DomainUint256) -> Self {
        input.0
    }
}

impl std::ops::Deref for DomainUint256 {
    type Target = U256;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
