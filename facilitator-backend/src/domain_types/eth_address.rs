//! DomainEthAddress - Address wrapper with lowercase-hex serde
//!
//! Ledger keys and stored records use the lowercase `0x…` form, so that is
//! what this type writes. Input is accepted in any case.

use ethers::types::Address;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct DomainEthAddress(pub Address);

/// Parse a `0x`-prefixed 20-byte hex address, case-insensitively.
pub fn parse_address(value: &str) -> Result<Address, String> {
    let trimmed = value.trim();
    let hex_part = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| format!("Address must be 0x-prefixed: {}", trimmed))?;

    if hex_part.len() != 40 {
        return Err(format!(
            "Invalid address length: expected 40 hex chars, got {} ({})",
            hex_part.len(),
            trimmed
        ));
    }

    let bytes = hex::decode(hex_part).map_err(|e| format!("Invalid address hex {}: {}", trimmed, e))?;
    Ok(Address::from_slice(&bytes))
}

/// Full lowercase hex form with 0x prefix.
pub fn lowercase_hex(address: &Address) -> String {
    format!("{:?}", address)
}

impl DomainEthAddress {
    pub fn to_lowercase_hex(&self) -> String {
        lowercase_hex(&self.0)
    }
}

impl From<Address> for DomainEthAddress {
    fn from(input: Address) -> Self {
        Self(input)
    }
}

impl From<DomainEthAddress> for Address {
    fn from(input: DomainEthAddress) -> Self {
        input.0
    }
}

impl std::ops::Deref for DomainEthAddress {
    type Target = Address;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromStr for DomainEthAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_address(s).map(Self)
    }
}

impl fmt::Display for DomainEthAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl Serialize for DomainEthAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_lowercase_hex())
    }
}

impl<'de> Deserialize<'de> for DomainEthAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_address(&s).map(Self).map_err(serde::de::Error::custom)
    }
}
