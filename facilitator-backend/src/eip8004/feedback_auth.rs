//! Feedback authorization tokens
//!
//! A token lets `client_address` submit up to `index_limit` feedback entries
//! for `agent_id` until `expiry`, signed by the agent's owner.
//!
//! Wire form: `abi.encode(7 fields) ++ signature(65)`. The signature is over
//! `keccak256("\x19Ethereum Signed Message:\n32" ++ keccak256(abi.encode(...)))`,
//! which is what the reputation registry recomputes.
//!
//! Ownership of `agent_id` by the signer is checked by the caller, not here.

use chrono::Utc;
use ethers::types::{Address, Signature, H256, U256};
use std::fmt;
use std::sync::Arc;

use super::abi::{decode_feedback_auth, encode_feedback_auth, keccak256, FEEDBACK_AUTH_STRUCT_LEN};
use super::config::NetworkRegistry;
use super::types::FeedbackAuthFields;
use crate::domain_types::lowercase_hex;
use crate::wallet::WalletProvider;

pub const DEFAULT_INDEX_LIMIT: u64 = 1000;
pub const DEFAULT_EXPIRY_SECS: u64 = 3600;

const PERSONAL_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";
const SIGNATURE_LEN: usize = 65;

pub fn struct_hash(encoding: &[u8]) -> H256 {
    H256::from(keccak256(encoding))
}

pub fn personal_message_hash(struct_hash: H256) -> H256 {
    let mut preimage = Vec::with_capacity(PERSONAL_MESSAGE_PREFIX.len() + 32);
    preimage.extend_from_slice(PERSONAL_MESSAGE_PREFIX);
    preimage.extend_from_slice(struct_hash.as_bytes());
    H256::from(keccak256(&preimage))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackAuthorizationToken {
    pub fields: FeedbackAuthFields,
    pub struct_encoding: Vec<u8>,
    pub struct_hash: H256,
    pub message_hash: H256,
    pub signature: Signature,
}

impl FeedbackAuthorizationToken {
    fn new(fields: FeedbackAuthFields, signature: Signature) -> Self {
        let struct_encoding = encode_feedback_auth(&fields);
        let struct_hash = struct_hash(&struct_encoding);
        Self {
            fields,
            message_hash: personal_message_hash(struct_hash),
            struct_hash,
            struct_encoding,
            signature,
        }
    }

    /// Struct encoding followed by the 65-byte signature
    pub fn encoded(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(FEEDBACK_AUTH_STRUCT_LEN + SIGNATURE_LEN);
        bytes.extend_from_slice(&self.struct_encoding);
        bytes.extend_from_slice(&self.signature.to_vec());
        bytes
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.encoded()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() != FEEDBACK_AUTH_STRUCT_LEN + SIGNATURE_LEN {
            return Err(format!(
                "Feedback auth must be {} bytes, got {}",
                FEEDBACK_AUTH_STRUCT_LEN + SIGNATURE_LEN,
                bytes.len()
            ));
        }

        let fields = decode_feedback_auth(&bytes[..FEEDBACK_AUTH_STRUCT_LEN])?;
        let signature = Signature::try_from(&bytes[FEEDBACK_AUTH_STRUCT_LEN..])
            .map_err(|e| format!("Invalid feedback auth signature: {}", e))?;

        Ok(Self::new(fields, signature))
    }

    pub fn decode_hex(value: &str) -> Result<Self, String> {
        let value = value.trim();
        let raw = hex::decode(value.strip_prefix("0x").unwrap_or(value))
            .map_err(|e| format!("Invalid feedback auth hex: {}", e))?;
        Self::decode(&raw)
    }

    /// Address whose key produced the signature
    pub fn recover_signer(&self) -> Result<Address, String> {
        self.signature
            .recover(self.message_hash)
            .map_err(|e| format!("Failed to recover feedback auth signer: {}", e))
    }

    pub fn is_expired_at(&self, unix_secs: u64) -> bool {
        self.fields.expiry <= U256::from(unix_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackAuthError {
    UnconfiguredRegistry { chain_id: u64 },
    SignerUnavailable,
    RemoteSignFailed { reason: String },
}

impl fmt::Display for FeedbackAuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedbackAuthError::UnconfiguredRegistry { chain_id } => {
                write!(f, "Identity registry not configured for chain {}", chain_id)
            }
            FeedbackAuthError::SignerUnavailable => {
                write!(f, "No signer available for the agent owner")
            }
            FeedbackAuthError::RemoteSignFailed { reason } => {
                write!(f, "Remote signing failed: {}", reason)
            }
        }
    }
}

impl std::error::Error for FeedbackAuthError {}

pub struct FeedbackAuthRequest {
    pub agent_id: U256,
    pub client_address: Address,
    /// Agent owner; the signature must recover to this address
    pub signer_address: Address,
    /// Chain of the identity registry
    pub chain_id: u64,
    pub index_limit: Option<u64>,
    pub expiry: Option<U256>,
    /// Tried first when present
    pub remote_signer: Option<Arc<dyn WalletProvider>>,
}

#[derive(Debug, Clone)]
pub struct IssuedFeedbackAuth {
    pub token: FeedbackAuthorizationToken,
    /// `mode_name` of the provider that signed
    pub signed_by: &'static str,
}

pub struct FeedbackAuthIssuer {
    networks: Arc<NetworkRegistry>,
    local_signer: Option<Arc<dyn WalletProvider>>,
}

impl FeedbackAuthIssuer {
    pub fn new(networks: Arc<NetworkRegistry>, local_signer: Option<Arc<dyn WalletProvider>>) -> Self {
        Self {
            networks,
            local_signer,
        }
    }

    pub async fn issue(&self, request: FeedbackAuthRequest) -> Result<IssuedFeedbackAuth, FeedbackAuthError> {
        let chain_id = request.chain_id;
        let identity_registry = self.networks.identity_registry(chain_id).map_err(|e| {
            log::error!("[FeedbackAuth] {}", e);
            FeedbackAuthError::UnconfiguredRegistry { chain_id }
        })?;

        let expiry = request.expiry.unwrap_or_else(|| {
            U256::from(Utc::now().timestamp().max(0) as u64 + DEFAULT_EXPIRY_SECS)
        });

        let fields = FeedbackAuthFields {
            agent_id: request.agent_id,
            client_address: request.client_address,
            index_limit: request.index_limit.unwrap_or(DEFAULT_INDEX_LIMIT),
            expiry,
            chain_id: U256::from(chain_id),
            identity_registry,
            signer_address: request.signer_address,
        };

        let message_hash = personal_message_hash(struct_hash(&encode_feedback_auth(&fields)));
        let (signature, signed_by) = self
            .sign(message_hash, request.signer_address, request.remote_signer.as_ref())
            .await?;

        let token = FeedbackAuthorizationToken::new(fields, signature);
        log::info!(
            "[FeedbackAuth] Issued for agent {} client {} (limit {}, expiry {}, signed {})",
            fields.agent_id,
            lowercase_hex(&fields.client_address),
            fields.index_limit,
            fields.expiry,
            signed_by
        );

        Ok(IssuedFeedbackAuth { token, signed_by })
    }

    /// Remote first, then a local key that belongs to the declared signer.
    async fn sign(
        &self,
        message_hash: H256,
        signer: Address,
        remote: Option<&Arc<dyn WalletProvider>>,
    ) -> Result<(Signature, &'static str), FeedbackAuthError> {
        let signer_hex = lowercase_hex(&signer);
        let local = self
            .local_signer
            .as_ref()
            .filter(|l| l.get_address().eq_ignore_ascii_case(&signer_hex));

        if let Some(remote) = remote {
            match remote_signature(remote.as_ref(), message_hash, signer).await {
                Ok(signature) => return Ok((signature, remote.mode_name())),
                Err(reason) if local.is_some() => {
                    log::warn!("[FeedbackAuth] Remote signer failed, signing locally: {}", reason);
                }
                Err(reason) => {
                    log::error!(
                        "[FeedbackAuth] Remote signer failed and no local key for {}: {}",
                        signer_hex,
                        reason
                    );
                    return Err(FeedbackAuthError::RemoteSignFailed { reason });
                }
            }
        }

        let Some(local) = local else {
            if let Some(configured) = &self.local_signer {
                log::warn!(
                    "[FeedbackAuth] Local key {} is not the agent owner {}",
                    configured.get_address(),
                    signer_hex
                );
            }
            return Err(FeedbackAuthError::SignerUnavailable);
        };

        let signature = local.sign_hash(message_hash).await.map_err(|e| {
            log::error!("[FeedbackAuth] Local signing failed: {}", e);
            FeedbackAuthError::SignerUnavailable
        })?;
        Ok((signature, local.mode_name()))
    }
}

fn check_signer(signature: &Signature, message_hash: H256, expected: Address) -> Result<(), String> {
    let recovered = signature
        .recover(message_hash)
        .map_err(|e| format!("Signature does not recover: {}", e))?;
    if recovered != expected {
        return Err(format!(
            "Signature recovers to {}, expected {}",
            lowercase_hex(&recovered),
            lowercase_hex(&expected)
        ));
    }
    Ok(())
}

/// A remote signature counts only if it parses and recovers to the signer.
async fn remote_signature(
    remote: &dyn WalletProvider,
    message_hash: H256,
    signer: Address,
) -> Result<Signature, String> {
    let signature = remote.sign_hash(message_hash).await?;
    check_signer(&signature, message_hash, signer)?;
    Ok(signature)
}
