//! EIP-7702 delegation authorizations
//!
//! An agent's EOA signs a one-time authorization naming a delegate contract.
//! Included in a type-4 transaction, it makes the chain run the delegate's
//! code with the agent account as the effective caller.
//!
//! [`DelegationVerifier`] only checks the delegate address against
//! configuration. Nonce and signature are enforced by the chain on submit.

use ethers::types::{Address, Signature, H256, U256};
use ethers::utils::rlp::RlpStream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::abi::keccak256;
use super::config::{NetworkError, NetworkRegistry};
use crate::domain_types::{lowercase_hex, DomainEthAddress, DomainUint256};

/// EIP-7702 authorization message prefix
const SET_CODE_AUTH_MAGIC: u8 = 0x05;

/// y-parity plus the two signature scalars
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorizationSignature {
    pub y_parity: u8,
    pub r: U256,
    pub s: U256,
}

/// One-time grant binding an EOA to a delegate contract for one transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "AuthorizationWire", into = "AuthorizationWire")]
pub struct DelegationAuthorization {
    pub chain_id: u64,
    pub delegate_address: Address,
    /// Must equal the account's transaction count when the tx lands
    pub account_nonce: u64,
    pub signature: AuthorizationSignature,
}

impl DelegationAuthorization {
    /// Digest the account signed: keccak256(0x05 || rlp([chain_id, address, nonce]))
    pub fn signing_hash(&self) -> H256 {
        let mut stream = RlpStream::new_list(3);
        stream.append(&self.chain_id);
        stream.append(&self.delegate_address);
        stream.append(&self.account_nonce);

        let mut preimage = vec![SET_CODE_AUTH_MAGIC];
        preimage.extend_from_slice(&stream.out());
        H256::from(keccak256(&preimage))
    }

    /// Recover the account that signed this authorization.
    pub fn recover_authority(&self) -> Result<Address, String> {
        let signature = Signature {
            r: self.signature.r,
            s: self.signature.s,
            v: self.signature.y_parity as u64 + 27,
        };
        signature
            .recover(self.signing_hash())
            .map_err(|e| format!("Failed to recover authorization signer: {}", e))
    }
}

/// JSON shape accepted from callers (viem / ethers style)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizationWire {
    chain_id: DomainUint256,
    #[serde(alias = "delegateAddress", alias = "contractAddress")]
    address: DomainEthAddress,
    nonce: DomainUint256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    y_parity: Option<DomainUint256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    v: Option<DomainUint256>,
    r: String,
    s: String,
}

fn fits_u64(value: U256, field: &str) -> Result<u64, String> {
    if value > U256::from(u64::MAX) {
        return Err(format!("{} does not fit in 64 bits: {}", field, value));
    }
    Ok(value.as_u64())
}

fn parse_scalar(value: &str, field: &str) -> Result<U256, String> {
    crate::domain_types::parse_uint256(value).map_err(|e| format!("Invalid {}: {}", field, e))
}

impl TryFrom<AuthorizationWire> for DelegationAuthorization {
    type Error = String;

    fn try_from(wire: AuthorizationWire) -> Result<Self, Self::Error> {
        let parity_source = wire
            .y_parity
            .or(wire.v)
            .ok_or_else(|| "Authorization missing yParity".to_string())?;

        let y_parity = match fits_u64(parity_source.0, "yParity")? {
            0 | 27 => 0u8,
            1 | 28 => 1u8,
            other => return Err(format!("Invalid authorization yParity/v: {}", other)),
        };

        Ok(Self {
            chain_id: fits_u64(wire.chain_id.0, "chainId")?,
            delegate_address: wire.address.0,
            account_nonce: fits_u64(wire.nonce.0, "nonce")?,
            signature: AuthorizationSignature {
                y_parity,
                r: parse_scalar(&wire.r, "r")?,
                s: parse_scalar(&wire.s, "s")?,
            },
        })
    }
}

impl From<DelegationAuthorization> for AuthorizationWire {
    fn from(auth: DelegationAuthorization) -> Self {
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        auth.signature.r.to_big_endian(&mut r);
        auth.signature.s.to_big_endian(&mut s);

        Self {
            chain_id: auth.chain_id.into(),
            address: auth.delegate_address.into(),
            nonce: auth.account_nonce.into(),
            y_parity: Some((auth.signature.y_parity as u64).into()),
            v: None,
            r: format!("0x{}", hex::encode(r)),
            s: format!("0x{}", hex::encode(s)),
        }
    }
}

/// Why an authorization was refused before any chain call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelegationError {
    DelegateMismatch {
        expected: String,
        got: String,
        chain_id: u64,
    },
    Configuration(NetworkError),
}

impl fmt::Display for DelegationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelegationError::DelegateMismatch { expected, got, chain_id } => write!(
                f,
                "Delegate address mismatch on chain {}: expected {}, got {}",
                chain_id, expected, got
            ),
            DelegationError::Configuration(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for DelegationError {}

/// Checks authorizations against the configured delegate contract per chain
#[derive(Clone)]
pub struct DelegationVerifier {
    networks: Arc<NetworkRegistry>,
}

impl DelegationVerifier {
    pub fn new(networks: Arc<NetworkRegistry>) -> Self {
        Self { networks }
    }

    /// `Ok` iff the authorization names the configured delegate for `chain_id`
    /// (compared case-insensitively).
    pub fn verify(
        &self,
        authorization: &DelegationAuthorization,
        chain_id: u64,
    ) -> Result<(), DelegationError> {
        let expected = self
            .networks
            .delegate_contract(chain_id)
            .map_err(DelegationError::Configuration)?;
        let got = lowercase_hex(&authorization.delegate_address);

        if !expected.trim().eq_ignore_ascii_case(&got) {
            return Err(DelegationError::DelegateMismatch {
                expected: expected.to_string(),
                got,
                chain_id,
            });
        }

        Ok(())
    }
}
