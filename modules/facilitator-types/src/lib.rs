//! Shared request/response types for the facilitator HTTP API and its clients.

use serde::{Deserialize, Serialize};

// =====================================================
// Registration
// =====================================================

/// One metadata entry for `register(string,(string,bytes)[])`.
///
/// `value` is either `0x`-hex bytes or plain text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetadataInput {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAgentRequest {
    pub agent_address: String,
    /// Signed EIP-7702 authorization, parsed by the backend
    pub authorization: serde_json::Value,
    #[serde(default)]
    pub token_uri: Option<String>,
    #[serde(default)]
    pub metadata: Vec<MetadataInput>,
    /// CAIP-2 id, bare chain id, or network name
    #[serde(default)]
    pub network: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Registered,
    AlreadyRegistered,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAgentResponse {
    pub status: RegistrationStatus,
    pub agent_address: String,
    /// Decimal string; absent when the receipt carried no decodable id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// "registered_event" or "mint_transfer"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id_source: Option<String>,
    pub chain_id: u64,
    pub transaction_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

/// Query for `GET /api/agents/{address}`; the default chain applies when absent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentLookupQuery {
    #[serde(default)]
    pub chain_id: Option<u64>,
}

// =====================================================
// Feedback Authorization
// =====================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueFeedbackAuthRequest {
    /// Decimal or `0x` hex
    pub agent_id: String,
    pub client_address: String,
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default)]
    pub index_limit: Option<u64>,
    /// Unix seconds
    #[serde(default)]
    pub expiry: Option<u64>,
    /// Paid resource URL; its origin hosts the owner's remote signer
    #[serde(default)]
    pub resource: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeFeedbackAuthRequest {
    /// `0x` hex of struct encoding ++ signature
    pub feedback_auth: String,
}

/// A presented token, decoded
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedFeedbackAuth {
    pub agent_id: String,
    pub client_address: String,
    pub index_limit: u64,
    pub expiry: String,
    pub chain_id: String,
    pub identity_registry: String,
    pub signer_address: String,
    pub struct_hash: String,
    /// Address the signature recovers to
    pub recovered_signer: String,
    /// True when `recovered_signer` equals `signer_address`
    pub signature_valid: bool,
    pub expired: bool,
}

// =====================================================
// Envelope
// =====================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
