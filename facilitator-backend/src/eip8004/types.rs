//! EIP-8004 Type definitions

use chrono::{DateTime, Utc};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::domain_types::{DomainEthAddress, DomainUint256};

/// One `(string key, bytes value)` entry passed to `register(string,(string,bytes)[])`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEntry {
    pub key: String,
    pub value: Vec<u8>,
}

impl MetadataEntry {
    /// Build an entry from caller input.
    ///
    /// A `0x`-prefixed value is taken as raw hex bytes; anything else is
    /// stored as its UTF-8 bytes. Both forms come back out of the chain
    /// unchanged, so callers may send either.
    pub fn from_input(key: &str, value: &str) -> Result<Self, String> {
        let bytes = match value.strip_prefix("0x") {
            Some(hex_part) => hex::decode(hex_part)
                .map_err(|e| format!("Metadata '{}' has invalid hex value: {}", key, e))?,
            None => value.as_bytes().to_vec(),
        };

        Ok(Self {
            key: key.to_string(),
            value: bytes,
        })
    }

    /// Value as `0x`-hex, the form it takes in calldata
    pub fn value_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.value))
    }

    /// Value decoded back to text, if it is valid UTF-8
    pub fn value_text(&self) -> Option<String> {
        String::from_utf8(self.value.clone()).ok()
    }
}

/// Which `register` overload a registration maps to.
///
/// Built once at the request boundary; the registrar matches on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationIntent {
    /// `register()`
    Bare,
    /// `register(string tokenURI)`
    WithUri { token_uri: String },
    /// `register(string tokenURI, (string key, bytes value)[] metadata)`
    WithMetadata {
        token_uri: String,
        metadata: Vec<MetadataEntry>,
    },
}

impl RegistrationIntent {
    /// Choose the overload from optional request fields.
    ///
    /// Metadata without a token URI still selects the metadata overload, with
    /// an empty URI, since that is the only overload that can carry it.
    pub fn from_parts(
        token_uri: Option<String>,
        metadata: Vec<MetadataEntry>,
    ) -> Self {
        let token_uri = token_uri.filter(|u| !u.is_empty());
        match (token_uri, metadata.is_empty()) {
            (None, true) => RegistrationIntent::Bare,
            (Some(token_uri), true) => RegistrationIntent::WithUri { token_uri },
            (token_uri, false) => RegistrationIntent::WithMetadata {
                token_uri: token_uri.unwrap_or_default(),
                metadata,
            },
        }
    }

    pub fn token_uri(&self) -> Option<&str> {
        match self {
            RegistrationIntent::Bare => None,
            RegistrationIntent::WithUri { token_uri }
            | RegistrationIntent::WithMetadata { token_uri, .. } => Some(token_uri),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RegistrationIntent::Bare => "register()",
            RegistrationIntent::WithUri { .. } => "register(string)",
            RegistrationIntent::WithMetadata { .. } => "register(string,(string,bytes)[])",
        }
    }
}

/// Durable outcome of a successful registration, stored in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRegistrationRecord {
    pub agent_address: DomainEthAddress,
    pub agent_id: DomainUint256,
    pub chain_id: u64,
    pub transaction_hash: String,
    pub registered_at: DateTime<Utc>,
}

/// The seven fields of a feedback authorization, in signing order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackAuthFields {
    pub agent_id: U256,
    pub client_address: Address,
    pub index_limit: u64,
    pub expiry: U256,
    pub chain_id: U256,
    pub identity_registry: Address,
    pub signer_address: Address,
}

/// Issued feedback authorization, stored per client address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackAuthRecord {
    pub agent_id: DomainUint256,
    pub client_address: DomainEthAddress,
    pub index_limit: u64,
    pub expiry: DomainUint256,
    pub chain_id: DomainUint256,
    pub identity_registry: DomainEthAddress,
    pub signer_address: DomainEthAddress,
    /// `0x` hex of struct encoding ++ signature
    pub feedback_auth: String,
    /// Which signer produced the signature ("remote" / "local")
    pub signed_by: String,
    pub issued_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_plain_text_round_trip() {
        for text in ["agentWallet", "héllo wörld", "", "0X-looks-like-hex-but-is-not"] {
            let entry = MetadataEntry::from_input("k", text).unwrap();
            let hex_payload = entry.value_hex();
            let decoded = hex::decode(hex_payload.trim_start_matches("0x")).unwrap();
            assert_eq!(String::from_utf8(decoded).unwrap(), text);
            assert_eq!(entry.value_text().as_deref(), Some(text));
        }
    }

    #[test]
    fn test_metadata_hex_is_taken_verbatim() {
        let entry = MetadataEntry::from_input("wallet", "0xdeadbeef").unwrap();
        assert_eq!(entry.value, vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(entry.value_hex(), "0xdeadbeef");
    }

    #[test]
    fn test_metadata_bad_hex_is_rejected() {
        let err = MetadataEntry::from_input("wallet", "0xnothex").unwrap_err();
        assert!(err.contains("wallet"), "got: {}", err);
    }

    #[test]
    fn test_intent_selection() {
        assert_eq!(RegistrationIntent::from_parts(None, vec![]), RegistrationIntent::Bare);
        assert_eq!(
            RegistrationIntent::from_parts(Some(String::new()), vec![]),
            RegistrationIntent::Bare
        );
        assert_eq!(
            RegistrationIntent::from_parts(Some("ipfs://x".into()), vec![]),
            RegistrationIntent::WithUri { token_uri: "ipfs://x".into() }
        );

        let entry = MetadataEntry::from_input("name", "bot").unwrap();
        let intent = RegistrationIntent::from_parts(Some("ipfs://x".into()), vec![entry.clone()]);
        assert_eq!(intent.label(), "register(string,(string,bytes)[])");
        assert_eq!(intent.token_uri(), Some("ipfs://x"));

        let no_uri = RegistrationIntent::from_parts(None, vec![entry]);
        assert_eq!(no_uri.token_uri(), Some(""));
    }
}
