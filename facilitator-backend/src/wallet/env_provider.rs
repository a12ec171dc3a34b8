//! Environment-based Wallet Provider
//!
//! Holds a private key loaded at startup.

use async_trait::async_trait;
use ethers::core::k256::ecdsa::SigningKey;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Signature, H256};

use super::WalletProvider;

/// Wallet provider backed by an in-process key
pub struct EnvWalletProvider {
    wallet: LocalWallet,
    address: String,
}

impl EnvWalletProvider {
    /// Create provider from a private key string, with or without `0x`
    pub fn from_private_key(private_key: &str) -> Result<Self, String> {
        let key_hex = private_key.trim();
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);

        let key_bytes = hex::decode(key_hex)
            .map_err(|e| format!("Invalid private key hex: {}", e))?;
        if key_bytes.len() != 32 {
            return Err(format!(
                "Invalid private key length: expected 32 bytes, got {}",
                key_bytes.len()
            ));
        }

        let signing_key = SigningKey::from_bytes(key_bytes.as_slice().into())
            .map_err(|e| format!("Invalid private key: {}", e))?;

        let wallet = LocalWallet::from(signing_key);
        let address = format!("{:?}", wallet.address()).to_lowercase();

        Ok(Self { wallet, address })
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }
}

#[async_trait]
impl WalletProvider for EnvWalletProvider {
    async fn sign_hash(&self, hash: H256) -> Result<Signature, String> {
        self.wallet
            .sign_hash(hash)
            .map_err(|e| format!("Local signing failed: {}", e))
    }

    fn get_address(&self) -> String {
        self.address.clone()
    }

    fn mode_name(&self) -> &'static str {
        "local"
    }
}
