//! Domain types for facilitator-backend
//!
//! Wrappers that give chain values a stable wire representation.

pub mod eth_address;
pub mod uint256;

pub use eth_address::{lowercase_hex, parse_address, DomainEthAddress};
pub use uint256::{parse_uint256, DomainUint256};
