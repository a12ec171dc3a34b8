use std::env;
use std::time::Duration;

/// Environment variable names read by the service.
pub mod env_vars {
    pub const PORT: &str = "PORT";
    pub const DATABASE_URL: &str = "DATABASE_URL";
    /// Gas-paying wallet that submits delegated registration transactions
    pub const FACILITATOR_PRIVATE_KEY: &str = "FACILITATOR_PRIVATE_KEY";
    /// Optional local key for signing feedback authorizations
    pub const AGENT_OWNER_PRIVATE_KEY: &str = "AGENT_OWNER_PRIVATE_KEY";
    pub const REMOTE_SIGNER_PATH: &str = "REMOTE_SIGNER_PATH";
    pub const DEFAULT_CHAIN_ID: &str = "DEFAULT_CHAIN_ID";
    pub const RECEIPT_TIMEOUT_SECS: &str = "RECEIPT_TIMEOUT_SECS";
    pub const RECEIPT_POLL_MS: &str = "RECEIPT_POLL_MS";
    pub const FALLBACK_GAS_LIMIT: &str = "FALLBACK_GAS_LIMIT";
    pub const LEDGER_SWEEP_SECS: &str = "LEDGER_SWEEP_SECS";
    /// Per-chain prefixes, suffixed with the decimal chain id
    pub const RPC_URL_PREFIX: &str = "RPC_URL_";
    pub const IDENTITY_REGISTRY_PREFIX: &str = "IDENTITY_REGISTRY_";
    pub const DELEGATE_CONTRACT_PREFIX: &str = "DELEGATE_CONTRACT_";
}

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATABASE_URL: &str = "./.db/facilitator.db";
pub const DEFAULT_REMOTE_SIGNER_PATH: &str = "/api/feedback-auth/sign";
pub const DEFAULT_CHAIN_ID: u64 = 84532;
pub const DEFAULT_RECEIPT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_RECEIPT_POLL_MS: u64 = 2000;
pub const DEFAULT_FALLBACK_GAS_LIMIT: u64 = 500_000;
pub const DEFAULT_LEDGER_SWEEP_SECS: u64 = 60;

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub facilitator_private_key: Option<String>,
    pub agent_owner_private_key: Option<String>,
    pub remote_signer_path: String,
    pub default_chain_id: u64,
    pub receipt_timeout: Duration,
    pub receipt_poll_interval: Duration,
    pub fallback_gas_limit: u64,
    pub ledger_sweep_interval: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup so tests don't have to mutate the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse_or = |key: &str, default: u64| -> u64 {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            port: lookup(env_vars::PORT)
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            database_url: non_empty(env_vars::DATABASE_URL)
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            facilitator_private_key: non_empty(env_vars::FACILITATOR_PRIVATE_KEY),
            agent_owner_private_key: non_empty(env_vars::AGENT_OWNER_PRIVATE_KEY),
            remote_signer_path: non_empty(env_vars::REMOTE_SIGNER_PATH)
                .unwrap_or_else(|| DEFAULT_REMOTE_SIGNER_PATH.to_string()),
            default_chain_id: parse_or(env_vars::DEFAULT_CHAIN_ID, DEFAULT_CHAIN_ID),
            receipt_timeout: Duration::from_secs(parse_or(
                env_vars::RECEIPT_TIMEOUT_SECS,
                DEFAULT_RECEIPT_TIMEOUT_SECS,
            )),
            receipt_poll_interval: Duration::from_millis(parse_or(
                env_vars::RECEIPT_POLL_MS,
                DEFAULT_RECEIPT_POLL_MS,
            )),
            fallback_gas_limit: parse_or(env_vars::FALLBACK_GAS_LIMIT, DEFAULT_FALLBACK_GAS_LIMIT),
            ledger_sweep_interval: Duration::from_secs(parse_or(
                env_vars::LEDGER_SWEEP_SECS,
                DEFAULT_LEDGER_SWEEP_SECS,
            )),
        }
    }
}
