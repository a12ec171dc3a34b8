//! Chain adapter
//!
//! The registrar only talks to a chain through [`ChainAdapter`]. The JSON-RPC
//! implementation lives in [`evm_rpc`]; tests substitute an in-memory fake.

pub mod evm_rpc;
pub mod set_code_tx;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256};
use tokio_util::sync::CancellationToken;

use crate::eip8004::delegation::DelegationAuthorization;

/// A log entry from a transaction receipt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxLog {
    pub address: Address,
    pub topics: Vec<H256>,
    pub data: Vec<u8>,
}

/// Minimal receipt view the registrar needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub transaction_hash: H256,
    /// `true` when the transaction executed without reverting
    pub status: bool,
    pub block_number: Option<u64>,
    pub logs: Vec<TxLog>,
}

/// Read, write and confirm primitives against one chain.
///
/// Errors are the underlying RPC / node text, unmodified.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain_id(&self) -> u64;

    /// Current transaction count (next nonce) of an account
    async fn get_transaction_count(&self, address: Address) -> Result<u64, String>;

    /// `eth_call` against a contract
    async fn call_contract_read(&self, to: Address, calldata: Bytes) -> Result<Bytes, String>;

    /// Submit a transaction carrying a delegation authorization list
    async fn send_transaction(
        &self,
        to: Address,
        data: Bytes,
        authorization_list: &[DelegationAuthorization],
    ) -> Result<H256, String>;

    /// Wait for the receipt. Returns early with an error when `cancel` fires
    /// or the adapter's configured timeout elapses.
    async fn wait_for_receipt(
        &self,
        tx_hash: H256,
        cancel: &CancellationToken,
    ) -> Result<TxReceipt, String>;
}

/// Builds adapters per chain id. Lets the registrar pick a chain at request
/// time while tests inject a fake.
pub trait ChainAdapterFactory: Send + Sync {
    fn adapter_for(&self, chain_id: u64) -> Result<std::sync::Arc<dyn ChainAdapter>, String>;
}
