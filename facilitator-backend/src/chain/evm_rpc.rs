//! JSON-RPC chain adapter
//!
//! Reads go through an `ethers` HTTP provider. Registration writes are type-4
//! set-code transactions, built in [`super::set_code_tx`], signed by the
//! facilitator's gas-paying wallet and broadcast raw.

use async_trait::async_trait;
use dashmap::DashMap;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, BlockNumber, Bytes, Eip1559TransactionRequest, TransactionReceipt, H256, U256, U64,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::set_code_tx::SetCodeTransaction;
use super::{ChainAdapter, ChainAdapterFactory, TxLog, TxReceipt};
use crate::config::{env_vars, Config};
use crate::domain_types::parse_address;
use crate::eip8004::config::{NetworkConfig, NetworkRegistry};
use crate::eip8004::delegation::DelegationAuthorization;
use crate::wallet::WalletProvider;

/// Timeouts and gas policy shared by every adapter
#[derive(Debug, Clone, Copy)]
pub struct AdapterSettings {
    pub receipt_timeout: Duration,
    pub poll_interval: Duration,
    pub fallback_gas_limit: u64,
}

impl AdapterSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            receipt_timeout: config.receipt_timeout,
            poll_interval: config.receipt_poll_interval,
            fallback_gas_limit: config.fallback_gas_limit,
        }
    }
}

pub struct EvmChainAdapter {
    chain_id: u64,
    provider: Provider<Http>,
    gas_payer: Option<Arc<dyn WalletProvider>>,
    settings: AdapterSettings,
}

impl EvmChainAdapter {
    pub fn new(
        network: &NetworkConfig,
        gas_payer: Option<Arc<dyn WalletProvider>>,
        settings: AdapterSettings,
    ) -> Result<Self, String> {
        let provider = Provider::<Http>::try_from(network.rpc_url.as_str())
            .map_err(|e| format!("Invalid RPC URL for chain {}: {}", network.chain_id, e))?;

        Ok(Self {
            chain_id: network.chain_id,
            provider,
            gas_payer,
            settings,
        })
    }

    fn gas_payer(&self) -> Result<&Arc<dyn WalletProvider>, String> {
        self.gas_payer.as_ref().ok_or_else(|| {
            format!(
                "No gas-paying wallet configured (set {})",
                env_vars::FACILITATOR_PRIVATE_KEY
            )
        })
    }

    /// `eth_estimateGas` with the authorization list attached, so the node
    /// accounts for the delegate's code. Falls back to the configured limit.
    async fn estimate_gas(
        &self,
        from: Address,
        to: Address,
        data: &Bytes,
        authorization_list: &[DelegationAuthorization],
    ) -> U256 {
        let params = serde_json::json!([{
            "from": format!("{:?}", from),
            "to": format!("{:?}", to),
            "data": data,
            "authorizationList": authorization_list
                .iter()
                .map(authorization_rpc_json)
                .collect::<Vec<_>>(),
        }]);

        match self.provider.request::<_, U256>("eth_estimateGas", params).await {
            // 20% headroom
            Ok(estimate) => estimate * 12 / 10,
            Err(e) => {
                log::warn!(
                    "[ChainAdapter] Gas estimation failed on chain {}, using fallback {}: {}",
                    self.chain_id,
                    self.settings.fallback_gas_limit,
                    e
                );
                U256::from(self.settings.fallback_gas_limit)
            }
        }
    }

    async fn fetch_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>, String> {
        self.provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| e.to_string())
    }
}

#[async_trait]
impl ChainAdapter for EvmChainAdapter {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn get_transaction_count(&self, address: Address) -> Result<u64, String> {
        let count = self
            .provider
            .get_transaction_count(address, None)
            .await
            .map_err(|e| e.to_string())?;
        u256_to_u64(count)
    }

    async fn call_contract_read(&self, to: Address, calldata: Bytes) -> Result<Bytes, String> {
        let tx: TypedTransaction = Eip1559TransactionRequest::new()
            .to(to)
            .data(calldata)
            .chain_id(self.chain_id)
            .into();

        self.provider
            .call(&tx, None)
            .await
            .map_err(|e| e.to_string())
    }

    async fn send_transaction(
        &self,
        to: Address,
        data: Bytes,
        authorization_list: &[DelegationAuthorization],
    ) -> Result<H256, String> {
        let gas_payer = self.gas_payer()?;
        let from = parse_address(&gas_payer.get_address())?;

        let nonce = self
            .provider
            .get_transaction_count(from, Some(BlockNumber::Pending.into()))
            .await
            .map_err(|e| e.to_string())?;

        let gas_limit = self.estimate_gas(from, to, &data, authorization_list).await;

        let (max_fee_per_gas, max_priority_fee_per_gas) = self
            .provider
            .estimate_eip1559_fees(None)
            .await
            .map_err(|e| e.to_string())?;

        let tx = SetCodeTransaction {
            chain_id: self.chain_id,
            nonce,
            max_priority_fee_per_gas,
            max_fee_per_gas,
            gas_limit,
            to,
            value: U256::zero(),
            data,
            authorization_list: authorization_list.to_vec(),
        };

        let signature = gas_payer.sign_hash(tx.signing_hash()).await?;
        let raw = tx.encode_signed(&signature)?;

        log::info!(
            "[ChainAdapter] Sending set-code tx on chain {}: to={:?} nonce={} gas={} auths={}",
            self.chain_id,
            to,
            nonce,
            gas_limit,
            authorization_list.len()
        );

        let pending = self
            .provider
            .send_raw_transaction(raw.clone())
            .await
            .map_err(|e| e.to_string())?;

        let tx_hash = *pending;
        if tx_hash != SetCodeTransaction::hash_signed(&raw) {
            log::warn!(
                "[ChainAdapter] Node returned tx hash {:?} different from local hash {:?}",
                tx_hash,
                SetCodeTransaction::hash_signed(&raw)
            );
        }

        Ok(tx_hash)
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: H256,
        cancel: &CancellationToken,
    ) -> Result<TxReceipt, String> {
        let deadline = tokio::time::sleep(self.settings.receipt_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(format!("Receipt wait for {:?} cancelled", tx_hash));
                }
                _ = &mut deadline => {
                    return Err(format!(
                        "Timed out after {}s waiting for receipt of {:?}",
                        self.settings.receipt_timeout.as_secs(),
                        tx_hash
                    ));
                }
                result = self.fetch_receipt(tx_hash) => match result {
                    Ok(Some(receipt)) => return Ok(convert_receipt(receipt)),
                    Ok(None) => {}
                    Err(e) => log::warn!("[ChainAdapter] Receipt poll for {:?} failed: {}", tx_hash, e),
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(format!("Receipt wait for {:?} cancelled", tx_hash));
                }
                _ = &mut deadline => {
                    return Err(format!(
                        "Timed out after {}s waiting for receipt of {:?}",
                        self.settings.receipt_timeout.as_secs(),
                        tx_hash
                    ));
                }
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }
    }
}

/// Authorization in the JSON-RPC quantity encoding nodes expect
pub fn authorization_rpc_json(auth: &DelegationAuthorization) -> serde_json::Value {
    serde_json::json!({
        "chainId": format!("{:#x}", auth.chain_id),
        "address": format!("{:?}", auth.delegate_address),
        "nonce": format!("{:#x}", auth.account_nonce),
        "yParity": format!("{:#x}", auth.signature.y_parity),
        "r": format!("{:#x}", auth.signature.r),
        "s": format!("{:#x}", auth.signature.s),
    })
}

fn u256_to_u64(value: U256) -> Result<u64, String> {
    if value > U256::from(u64::MAX) {
        return Err(format!("Value {} does not fit in u64", value));
    }
    Ok(value.as_u64())
}

fn convert_receipt(receipt: TransactionReceipt) -> TxReceipt {
    TxReceipt {
        transaction_hash: receipt.transaction_hash,
        status: receipt.status == Some(U64::from(1)),
        block_number: receipt.block_number.map(|b| b.as_u64()),
        logs: receipt
            .logs
            .into_iter()
            .map(|log| TxLog {
                address: log.address,
                topics: log.topics,
                data: log.data.to_vec(),
            })
            .collect(),
    }
}

/// Builds and caches one [`EvmChainAdapter`] per configured chain
pub struct EvmAdapterFactory {
    networks: Arc<NetworkRegistry>,
    gas_payer: Option<Arc<dyn WalletProvider>>,
    settings: AdapterSettings,
    adapters: DashMap<u64, Arc<EvmChainAdapter>>,
}

impl EvmAdapterFactory {
    pub fn new(
        networks: Arc<NetworkRegistry>,
        gas_payer: Option<Arc<dyn WalletProvider>>,
        settings: AdapterSettings,
    ) -> Self {
        Self {
            networks,
            gas_payer,
            settings,
            adapters: DashMap::new(),
        }
    }
}

impl ChainAdapterFactory for EvmAdapterFactory {
    fn adapter_for(&self, chain_id: u64) -> Result<Arc<dyn ChainAdapter>, String> {
        if let Some(adapter) = self.adapters.get(&chain_id) {
            return Ok(adapter.value().clone());
        }

        let network = self.networks.get(chain_id).map_err(|e| e.to_string())?;
        let adapter = Arc::new(EvmChainAdapter::new(
            network,
            self.gas_payer.clone(),
            self.settings,
        )?);
        log::info!(
            "[ChainAdapter] Connected chain {} ({}) via {}",
            chain_id,
            network.name,
            network.rpc_url
        );

        self.adapters.insert(chain_id, adapter.clone());
        Ok(adapter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eip8004::delegation::tests::{sample_authorization, DELEGATE_CHECKSUMMED};
    use ethers::types::Log;

    fn settings(timeout_ms: u64) -> AdapterSettings {
        AdapterSettings {
            receipt_timeout: Duration::from_millis(timeout_ms),
            poll_interval: Duration::from_millis(20),
            fallback_gas_limit: 500_000,
        }
    }

    fn unreachable_network() -> NetworkConfig {
        NetworkConfig {
            chain_id: 31337,
            name: "local".to_string(),
            rpc_url: "http://127.0.0.1:1".to_string(),
            identity_registry: None,
            delegate_contract: None,
            explorer_url: None,
        }
    }

    #[test]
    fn test_authorization_rpc_json_uses_hex_quantities() {
        let auth = sample_authorization(84532, DELEGATE_CHECKSUMMED, 10);
        let json = authorization_rpc_json(&auth);
        assert_eq!(json["chainId"], "0x14a34");
        assert_eq!(json["nonce"], "0xa");
        assert_eq!(json["yParity"], "0x1");
        assert_eq!(json["r"], "0x7");
        assert_eq!(json["address"], DELEGATE_CHECKSUMMED.to_lowercase());
    }

    #[test]
    fn test_convert_receipt_status_and_logs() {
        let mut receipt = TransactionReceipt::default();
        receipt.status = Some(U64::from(1));
        receipt.block_number = Some(U64::from(99));
        receipt.logs = vec![Log {
            address: Address::repeat_byte(0x80),
            topics: vec![H256::repeat_byte(1)],
            data: Bytes::from(vec![1, 2, 3]),
            ..Default::default()
        }];

        let converted = convert_receipt(receipt.clone());
        assert!(converted.status);
        assert_eq!(converted.block_number, Some(99));
        assert_eq!(converted.logs[0].data, vec![1, 2, 3]);

        receipt.status = Some(U64::zero());
        assert!(!convert_receipt(receipt).status);
    }

    #[test]
    fn test_factory_unknown_chain_and_caching() {
        let networks = Arc::new(NetworkRegistry::builtin().with_network(unreachable_network()));
        let factory = EvmAdapterFactory::new(networks, None, settings(100));

        assert!(factory.adapter_for(999_999).is_err());

        let first = factory.adapter_for(31337).unwrap();
        let second = factory.adapter_for(31337).unwrap();
        assert_eq!(first.chain_id(), 31337);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_send_without_gas_payer_fails_before_rpc() {
        let adapter = EvmChainAdapter::new(&unreachable_network(), None, settings(100)).unwrap();
        let err = adapter
            .send_transaction(Address::zero(), Bytes::new(), &[])
            .await
            .unwrap_err();
        assert!(err.contains(env_vars::FACILITATOR_PRIVATE_KEY), "got: {}", err);
    }

    #[tokio::test]
    async fn test_receipt_wait_times_out() {
        let adapter = EvmChainAdapter::new(&unreachable_network(), None, settings(150)).unwrap();
        let cancel = CancellationToken::new();
        let err = adapter
            .wait_for_receipt(H256::zero(), &cancel)
            .await
            .unwrap_err();
        assert!(err.contains("Timed out"), "got: {}", err);
    }

    #[tokio::test]
    async fn test_receipt_wait_honors_cancellation() {
        let adapter = EvmChainAdapter::new(&unreachable_network(), None, settings(60_000)).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = adapter
            .wait_for_receipt(H256::zero(), &cancel)
            .await
            .unwrap_err();
        assert!(err.contains("cancelled"), "got: {}", err);
    }
}
