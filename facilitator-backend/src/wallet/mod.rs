//! Wallet Provider Abstraction
//!
//! Everything that signs goes through [`WalletProvider`]:
//!
//! - **Local**: private key loaded from the environment ([`EnvWalletProvider`]).
//!   Used for the gas-paying facilitator wallet and, optionally, as the
//!   fallback feedback-authorization signer.
//! - **Remote**: hash signing proxied to an HTTP signer next to the protected
//!   resource ([`RemoteSigner`]).

mod env_provider;
mod remote_provider;

pub use env_provider::EnvWalletProvider;
pub use remote_provider::RemoteSigner;

use async_trait::async_trait;
use ethers::types::{Signature, H256};
use std::sync::Arc;

/// Trait for wallet providers - abstracts where the key lives
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Sign a 32-byte digest as-is (no message prefixing)
    async fn sign_hash(&self, hash: H256) -> Result<Signature, String>;

    /// Lowercase `0x` address this provider signs as
    fn get_address(&self) -> String;

    /// Get the mode name for logging
    fn mode_name(&self) -> &'static str;
}

/// Build a local provider from an optional key, logging which role it serves.
pub fn local_provider(
    private_key: Option<&str>,
    role: &str,
) -> Result<Option<Arc<dyn WalletProvider>>, String> {
    let Some(key) = private_key else {
        log::warn!("[Wallet] No {} key configured", role);
        return Ok(None);
    };

    let provider = EnvWalletProvider::from_private_key(key)
        .map_err(|e| format!("Invalid {} key: {}", role, e))?;
    log::info!("[Wallet] {} wallet: {:?}", role, provider.address());
    Ok(Some(Arc::new(provider)))
}
