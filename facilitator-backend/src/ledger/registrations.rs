//! Typed records on top of the key-value store
//!
//! Storage problems never escape this layer: reads that fail or hold
//! undecodable JSON come back as absent, failed writes are logged.

use chrono::Utc;
use ethers::types::{Address, U256};
use std::sync::Arc;
use std::time::Duration;

use super::KvStore;
use crate::domain_types::lowercase_hex;
use crate::eip8004::types::{AgentRegistrationRecord, FeedbackAuthRecord};

/// One registration per agent per chain; each chain has its own identity registry
pub fn registration_key(chain_id: u64, agent_address: &Address) -> String {
    format!("registration:{}:{}", chain_id, lowercase_hex(agent_address))
}

pub fn feedback_auth_key(client_address: &Address) -> String {
    format!("feedback_auth:{}", lowercase_hex(client_address))
}

#[derive(Clone)]
pub struct RegistrationLedger {
    store: Arc<dyn KvStore>,
}

impl RegistrationLedger {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    async fn read_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                log::warn!("[Ledger] Read of '{}' failed: {}", key, e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("[Ledger] Ignoring undecodable record '{}': {}", key, e);
                None
            }
        }
    }

    async fn write_json<T: serde::Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                log::error!("[Ledger] Failed to serialize '{}': {}", key, e);
                return;
            }
        };

        if let Err(e) = self.store.set(key, &raw, ttl).await {
            log::error!("[Ledger] Write of '{}' failed: {}", key, e);
        }
    }

    pub async fn registration(
        &self,
        chain_id: u64,
        agent_address: &Address,
    ) -> Option<AgentRegistrationRecord> {
        self.read_json(&registration_key(chain_id, agent_address)).await
    }

    pub async fn record_registration(&self, record: &AgentRegistrationRecord) {
        let key = registration_key(record.chain_id, &record.agent_address.0);
        log::info!(
            "[Ledger] Recording agent {} -> id {} (chain {})",
            record.agent_address,
            record.agent_id,
            record.chain_id
        );
        self.write_json(&key, record, None).await;
    }

    /// Store the latest token for a client, replacing any earlier one. The
    /// entry expires together with the token.
    pub async fn store_feedback_auth(&self, record: &FeedbackAuthRecord) {
        let now = U256::from(Utc::now().timestamp().max(0) as u64);
        let expiry = record.expiry.0;
        if expiry <= now {
            log::warn!(
                "[Ledger] Not storing feedback auth for {}: already expired",
                record.client_address
            );
            return;
        }

        let remaining = expiry - now;
        let ttl = if remaining > U256::from(u64::MAX) {
            None
        } else {
            Some(Duration::from_secs(remaining.as_u64()))
        };

        self.write_json(&feedback_auth_key(&record.client_address.0), record, ttl)
            .await;
    }

    pub async fn feedback_auth(&self, client_address: &Address) -> Option<FeedbackAuthRecord> {
        self.read_json(&feedback_auth_key(client_address)).await
    }
}
