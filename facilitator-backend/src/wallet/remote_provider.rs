//! Remote hash signer
//!
//! Proxies signing to an HTTP endpoint that holds the agent owner's key. The
//! endpoint lives next to the protected resource: its URL is the resource's
//! origin plus a configured path suffix.
//!
//! Request:  `POST <origin><path>` with `{"hash": "0x…"}`
//! Response: `{"signature": "0x…"}` (65 bytes, r || s || v)

use async_trait::async_trait;
use ethers::types::{Signature, H256, U256};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use super::WalletProvider;

const REMOTE_SIGN_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize)]
struct SignHashRequest {
    hash: String,
}

#[derive(Debug, Deserialize)]
struct SignHashResponse {
    signature: String,
}

/// Signs as a declared address through a remote endpoint
pub struct RemoteSigner {
    endpoint: String,
    /// Lowercase address the endpoint is expected to sign as
    address: String,
    http_client: reqwest::Client,
}

impl RemoteSigner {
    /// Derive the signer endpoint from a resource URL.
    ///
    /// `https://api.example.com/paid/thing?x=1` with path `/api/feedback-auth/sign`
    /// becomes `https://api.example.com/api/feedback-auth/sign`.
    pub fn for_resource(resource: &str, path_suffix: &str, signer_address: &str) -> Result<Self, String> {
        let endpoint = Self::endpoint_for(resource, path_suffix)?;
        Ok(Self {
            endpoint,
            address: signer_address.to_lowercase(),
            http_client: crate::http::shared_client().clone(),
        })
    }

    pub fn endpoint_for(resource: &str, path_suffix: &str) -> Result<String, String> {
        let url = Url::parse(resource)
            .map_err(|e| format!("Invalid resource URL '{}': {}", resource, e))?;

        let origin = url.origin();
        if !origin.is_tuple() {
            return Err(format!("Resource URL '{}' has no usable origin", resource));
        }

        let suffix = if path_suffix.starts_with('/') {
            path_suffix.to_string()
        } else {
            format!("/{}", path_suffix)
        };

        Ok(format!("{}{}", origin.ascii_serialization(), suffix))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Parse an Ethereum signature from hex string
    pub fn parse_signature(sig_hex: &str) -> Result<Signature, String> {
        let sig_hex = sig_hex.trim();
        let sig_hex = sig_hex.strip_prefix("0x").unwrap_or(sig_hex);

        if sig_hex.len() != 130 {
            return Err(format!(
                "Invalid signature length: expected 130 hex chars, got {}",
                sig_hex.len()
            ));
        }

        let sig_bytes = hex::decode(sig_hex)
            .map_err(|e| format!("Invalid signature hex: {}", e))?;

        let r = U256::from_big_endian(&sig_bytes[0..32]);
        let s = U256::from_big_endian(&sig_bytes[32..64]);
        let v_byte = sig_bytes[64];

        // Some signers return 0/1, ecrecover wants 27/28
        let v = if v_byte < 27 {
            v_byte as u64 + 27
        } else {
            v_byte as u64
        };

        Ok(Signature { r, s, v })
    }
}

#[async_trait]
impl WalletProvider for RemoteSigner {
    async fn sign_hash(&self, hash: H256) -> Result<Signature, String> {
        log::debug!("[RemoteSigner] Signing hash via {}", self.endpoint);

        let request = SignHashRequest {
            hash: format!("{:?}", hash),
        };

        let response = self
            .http_client
            .post(&self.endpoint)
            .timeout(REMOTE_SIGN_TIMEOUT)
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("Remote signer request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Remote signer error ({}): {}", status, body));
        }

        let data: SignHashResponse = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse remote signer response: {}", e))?;

        Self::parse_signature(&data.signature)
    }

    fn get_address(&self) -> String {
        self.address.clone()
    }

    fn mode_name(&self) -> &'static str {
        "remote"
    }
}
