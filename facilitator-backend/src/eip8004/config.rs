//! EIP-8004 network configuration
//!
//! Chain id → RPC endpoint, identity registry and delegate contract.
//! Registry addresses have a built-in default table; delegate contracts never
//! do and must come from the environment. RPC URLs may fall back to a public
//! endpoint.

use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::config::env_vars;
use crate::domain_types::parse_address;

/// ERC-8004 identity registry (mainnet deployments)
const MAINNET_IDENTITY_REGISTRY: &str = "0x8004A169FB4a3325136EB29fA0ceB6D2e539a432";
/// ERC-8004 identity registry (testnet deployments)
const TESTNET_IDENTITY_REGISTRY: &str = "0x8004A818BFB912233c491871b3d84c89A494BD9e";

/// Per-chain configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: u64,
    /// Display name
    pub name: String,
    pub rpc_url: String,
    pub identity_registry: Option<String>,
    /// EIP-7702 delegate contract that agents authorize for registration
    pub delegate_contract: Option<String>,
    pub explorer_url: Option<String>,
}

impl NetworkConfig {
    fn builtin(chain_id: u64, name: &str, rpc_url: &str, registry: &str, explorer: &str) -> Self {
        Self {
            chain_id,
            name: name.to_string(),
            rpc_url: rpc_url.to_string(),
            identity_registry: Some(registry.to_string()),
            delegate_contract: None,
            explorer_url: Some(explorer.to_string()),
        }
    }

    /// Get block explorer URL for a transaction
    pub fn tx_url(&self, tx_hash: &str) -> Option<String> {
        self.explorer_url
            .as_ref()
            .map(|base| format!("{}/tx/{}", base, tx_hash))
    }

    /// CAIP-10 style registry string, e.g. "eip155:84532:0x8004…"
    pub fn agent_registry_string(&self) -> Option<String> {
        self.identity_registry
            .as_ref()
            .map(|addr| format!("eip155:{}:{}", self.chain_id, addr.to_lowercase()))
    }
}

/// Configuration errors. Always fatal to the request that hit them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    UnknownNetwork(String),
    UnknownChain { chain_id: u64 },
    UnconfiguredRegistry { chain_id: u64 },
    DelegateNotConfigured { chain_id: u64 },
    InvalidAddress { chain_id: u64, value: String, reason: String },
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::UnknownNetwork(hint) => write!(f, "Unknown network '{}'", hint),
            NetworkError::UnknownChain { chain_id } => {
                write!(f, "No network configuration for chain {}", chain_id)
            }
            NetworkError::UnconfiguredRegistry { chain_id } => write!(
                f,
                "Identity registry not configured for chain {} (set {}{})",
                chain_id,
                env_vars::IDENTITY_REGISTRY_PREFIX,
                chain_id
            ),
            NetworkError::DelegateNotConfigured { chain_id } => write!(
                f,
                "Delegate contract not configured for chain {} (set {}{})",
                chain_id,
                env_vars::DELEGATE_CONTRACT_PREFIX,
                chain_id
            ),
            NetworkError::InvalidAddress { chain_id, value, reason } => write!(
                f,
                "Invalid configured address '{}' for chain {}: {}",
                value, chain_id, reason
            ),
        }
    }
}

impl std::error::Error for NetworkError {}

/// All known networks, keyed by chain id
#[derive(Debug, Clone)]
pub struct NetworkRegistry {
    networks: HashMap<u64, NetworkConfig>,
}

impl NetworkRegistry {
    /// Built-in networks without any environment overrides
    pub fn builtin() -> Self {
        let defaults = [
            NetworkConfig::builtin(
                1,
                "Ethereum",
                "https://eth.llamarpc.com",
                MAINNET_IDENTITY_REGISTRY,
                "https://etherscan.io",
            ),
            NetworkConfig::builtin(
                8453,
                "Base",
                "https://mainnet.base.org",
                MAINNET_IDENTITY_REGISTRY,
                "https://basescan.org",
            ),
            NetworkConfig::builtin(
                84532,
                "Base Sepolia",
                "https://sepolia.base.org",
                TESTNET_IDENTITY_REGISTRY,
                "https://sepolia.basescan.org",
            ),
            NetworkConfig::builtin(
                11155111,
                "Sepolia",
                "https://ethereum-sepolia-rpc.publicnode.com",
                TESTNET_IDENTITY_REGISTRY,
                "https://sepolia.etherscan.io",
            ),
        ];

        Self {
            networks: defaults.into_iter().map(|n| (n.chain_id, n)).collect(),
        }
    }

    /// Load built-ins and apply `RPC_URL_<id>`, `IDENTITY_REGISTRY_<id>` and
    /// `DELEGATE_CONTRACT_<id>` overrides from the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut registry = Self::builtin();

        for (key, value) in vars {
            let key = key.as_ref();
            let value = value.as_ref().trim();
            if value.is_empty() {
                continue;
            }

            if let Some(chain_id) = chain_suffix(key, env_vars::RPC_URL_PREFIX) {
                registry.entry(chain_id).rpc_url = value.to_string();
            } else if let Some(chain_id) = chain_suffix(key, env_vars::IDENTITY_REGISTRY_PREFIX) {
                registry.entry(chain_id).identity_registry = Some(value.to_string());
            } else if let Some(chain_id) = chain_suffix(key, env_vars::DELEGATE_CONTRACT_PREFIX) {
                registry.entry(chain_id).delegate_contract = Some(value.to_string());
            }
        }

        // A chain only reachable through an override but lacking an RPC URL is unusable
        registry.networks.retain(|chain_id, network| {
            if network.rpc_url.is_empty() {
                log::warn!(
                    "[Networks] Ignoring chain {}: no {}{} configured",
                    chain_id,
                    env_vars::RPC_URL_PREFIX,
                    chain_id
                );
                false
            } else {
                true
            }
        });

        registry
    }

    fn entry(&mut self, chain_id: u64) -> &mut NetworkConfig {
        self.networks.entry(chain_id).or_insert_with(|| NetworkConfig {
            chain_id,
            name: format!("eip155:{}", chain_id),
            rpc_url: String::new(),
            identity_registry: None,
            delegate_contract: None,
            explorer_url: None,
        })
    }

    #[cfg(test)]
    pub fn with_network(mut self, network: NetworkConfig) -> Self {
        self.networks.insert(network.chain_id, network);
        self
    }

    pub fn get(&self, chain_id: u64) -> Result<&NetworkConfig, NetworkError> {
        self.networks
            .get(&chain_id)
            .ok_or(NetworkError::UnknownChain { chain_id })
    }

    pub fn chain_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.networks.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Identity registry for a chain. Unknown chains and chains without a
    /// registry are configuration errors, never a silent default.
    pub fn identity_registry(&self, chain_id: u64) -> Result<Address, NetworkError> {
        let network = self
            .networks
            .get(&chain_id)
            .ok_or(NetworkError::UnconfiguredRegistry { chain_id })?;
        let raw = network
            .identity_registry
            .as_deref()
            .ok_or(NetworkError::UnconfiguredRegistry { chain_id })?;

        parse_address(raw).map_err(|reason| NetworkError::InvalidAddress {
            chain_id,
            value: raw.to_string(),
            reason,
        })
    }

    /// Configured delegate contract for a chain, as written in configuration.
    /// The value must parse as an address.
    pub fn delegate_contract(&self, chain_id: u64) -> Result<&str, NetworkError> {
        let raw = self
            .networks
            .get(&chain_id)
            .and_then(|n| n.delegate_contract.as_deref())
            .ok_or(NetworkError::DelegateNotConfigured { chain_id })?;

        parse_address(raw).map_err(|reason| NetworkError::InvalidAddress {
            chain_id,
            value: raw.to_string(),
            reason,
        })?;
        Ok(raw)
    }

    /// Resolve a caller-supplied network hint to a chain id.
    ///
    /// Accepts CAIP-2 (`eip155:84532`), a bare decimal id, or a known name.
    pub fn resolve_network(&self, hint: &str) -> Result<u64, NetworkError> {
        let normalized = hint.trim().to_lowercase();

        let chain_id = if let Some(id) = normalized.strip_prefix("eip155:") {
            id.parse::<u64>().ok()
        } else if let Ok(id) = normalized.parse::<u64>() {
            Some(id)
        } else {
            match normalized.as_str() {
                "ethereum" | "mainnet" => Some(1),
                "base" => Some(8453),
                "base-sepolia" | "base_sepolia" => Some(84532),
                "sepolia" | "ethereum-sepolia" => Some(11155111),
                _ => None,
            }
        };

        chain_id.ok_or_else(|| NetworkError::UnknownNetwork(hint.to_string()))
    }
}

impl Default for NetworkRegistry {
    fn default() -> Self {
        Self::from_env()
    }
}

fn chain_suffix(key: &str, prefix: &str) -> Option<u64> {
    key.strip_prefix(prefix).and_then(|suffix| suffix.parse().ok())
}
