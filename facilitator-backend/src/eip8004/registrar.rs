//! Delegated agent registration
//!
//! The agent's EOA signs an EIP-7702 authorization for the delegate contract.
//! The facilitator pays gas for a set-code transaction addressed to the agent
//! itself, so the delegate's code runs as the agent and calls `register` on
//! the identity registry. The minted id is read back from the receipt.
//!
//! Flow: resolve chain, ledger check, resolve registry, verify delegate,
//! nonce check (warning only), submit, wait, decode, record.

use chrono::Utc;
use dashmap::DashMap;
use ethers::types::{Address, Bytes, H256, U256};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use super::abi::{encode_register, extract_agent_id, AgentIdSource};
use super::config::{NetworkError, NetworkRegistry};
use super::delegation::{DelegationAuthorization, DelegationError, DelegationVerifier};
use super::types::{AgentRegistrationRecord, RegistrationIntent};
use crate::chain::ChainAdapterFactory;
use crate::domain_types::lowercase_hex;
use crate::ledger::RegistrationLedger;

pub struct RegistrationRequest {
    pub agent_address: Address,
    pub authorization: DelegationAuthorization,
    pub intent: RegistrationIntent,
    /// Optional network hint; the authorization's chain id is used otherwise
    pub network: Option<String>,
}

/// Non-fatal findings. Logged and returned, never block submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationDiagnostic {
    NonceMismatch {
        account_nonce: u64,
        authorization_nonce: u64,
    },
    NonceUnavailable {
        reason: String,
    },
    /// Authorization is bound to a different chain than the one targeted
    ChainMismatch {
        authorization_chain_id: u64,
        target_chain_id: u64,
    },
    /// Authorization signature recovers to someone other than the agent
    AuthorityMismatch {
        recovered: String,
    },
    /// Transaction confirmed but no agent id could be read from its logs
    AgentIdUndecoded,
}

impl fmt::Display for RegistrationDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationDiagnostic::NonceMismatch {
                account_nonce,
                authorization_nonce,
            } => write!(
                f,
                "Authorization nonce {} does not match account nonce {}",
                authorization_nonce, account_nonce
            ),
            RegistrationDiagnostic::NonceUnavailable { reason } => {
                write!(f, "Could not read account nonce: {}", reason)
            }
            RegistrationDiagnostic::ChainMismatch {
                authorization_chain_id,
                target_chain_id,
            } => write!(
                f,
                "Authorization signed for chain {} but submitting on chain {}",
                authorization_chain_id, target_chain_id
            ),
            RegistrationDiagnostic::AuthorityMismatch { recovered } => {
                write!(f, "Authorization was signed by {}, not the agent", recovered)
            }
            RegistrationDiagnostic::AgentIdUndecoded => {
                write!(f, "No Registered or mint Transfer event from the registry")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// The ledger already holds a record; nothing was sent
    AlreadyRegistered(AgentRegistrationRecord),
    Confirmed {
        chain_id: u64,
        transaction_hash: H256,
        agent_id: Option<U256>,
        agent_id_source: Option<AgentIdSource>,
        diagnostics: Vec<RegistrationDiagnostic>,
    },
}

impl RegistrationOutcome {
    pub fn agent_id(&self) -> Option<U256> {
        match self {
            RegistrationOutcome::AlreadyRegistered(record) => Some(record.agent_id.0),
            RegistrationOutcome::Confirmed { agent_id, .. } => *agent_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrarError {
    Configuration(NetworkError),
    Delegation(DelegationError),
    /// RPC failure before the transaction was accepted. Message is the node's.
    Chain(String),
    /// Sent, but the receipt wait failed (timeout, cancellation, RPC). The
    /// transaction may still land.
    ConfirmationFailed { transaction_hash: H256, reason: String },
    Reverted { chain_id: u64, transaction_hash: H256 },
}

impl fmt::Display for RegistrarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrarError::Configuration(e) => write!(f, "{}", e),
            RegistrarError::Delegation(e) => write!(f, "{}", e),
            RegistrarError::Chain(message) => write!(f, "{}", message),
            RegistrarError::ConfirmationFailed {
                transaction_hash,
                reason,
            } => write!(f, "Transaction {:?} sent but not confirmed: {}", transaction_hash, reason),
            RegistrarError::Reverted {
                chain_id,
                transaction_hash,
            } => write!(
                f,
                "Registration transaction {:?} reverted on chain {}",
                transaction_hash, chain_id
            ),
        }
    }
}

impl std::error::Error for RegistrarError {}

impl From<NetworkError> for RegistrarError {
    fn from(e: NetworkError) -> Self {
        RegistrarError::Configuration(e)
    }
}

impl From<DelegationError> for RegistrarError {
    fn from(e: DelegationError) -> Self {
        match e {
            DelegationError::Configuration(inner) => RegistrarError::Configuration(inner),
            other => RegistrarError::Delegation(other),
        }
    }
}

pub struct AgentRegistrar {
    networks: Arc<NetworkRegistry>,
    verifier: DelegationVerifier,
    chains: Arc<dyn ChainAdapterFactory>,
    ledger: RegistrationLedger,
    /// Per-address lease so one process never double-submits for an agent
    leases: DashMap<String, Arc<Mutex<()>>>,
}

impl AgentRegistrar {
    pub fn new(
        networks: Arc<NetworkRegistry>,
        chains: Arc<dyn ChainAdapterFactory>,
        ledger: RegistrationLedger,
    ) -> Self {
        Self {
            verifier: DelegationVerifier::new(networks.clone()),
            networks,
            chains,
            ledger,
            leases: DashMap::new(),
        }
    }

    pub async fn register(
        &self,
        request: RegistrationRequest,
        cancel: &CancellationToken,
    ) -> Result<RegistrationOutcome, RegistrarError> {
        let lease = Lease::acquire(&self.leases, lowercase_hex(&request.agent_address));
        let _held = lease.lock().await;
        self.register_locked(request, cancel).await
    }

    async fn register_locked(
        &self,
        request: RegistrationRequest,
        cancel: &CancellationToken,
    ) -> Result<RegistrationOutcome, RegistrarError> {
        let RegistrationRequest {
            agent_address,
            authorization,
            intent,
            network,
        } = request;

        let chain_id = match network.as_deref().filter(|n| !n.trim().is_empty()) {
            Some(hint) => self.networks.resolve_network(hint)?,
            None => authorization.chain_id,
        };

        if let Some(existing) = self.ledger.registration(chain_id, &agent_address).await {
            log::info!(
                "[Registrar] {} already registered as agent {} on chain {}",
                existing.agent_address,
                existing.agent_id,
                chain_id
            );
            return Ok(RegistrationOutcome::AlreadyRegistered(existing));
        }
        let registry = self.networks.identity_registry(chain_id)?;
        self.verifier.verify(&authorization, chain_id)?;

        let mut diagnostics = Vec::new();

        // Chain id 0 authorizations are valid on every chain
        if authorization.chain_id != 0 && authorization.chain_id != chain_id {
            diagnostics.push(RegistrationDiagnostic::ChainMismatch {
                authorization_chain_id: authorization.chain_id,
                target_chain_id: chain_id,
            });
        }

        match authorization.recover_authority() {
            Ok(authority) if authority != agent_address => {
                diagnostics.push(RegistrationDiagnostic::AuthorityMismatch {
                    recovered: lowercase_hex(&authority),
                });
            }
            Ok(_) => {}
            Err(e) => log::debug!("[Registrar] Could not recover authorization signer: {}", e),
        }

        let adapter = self
            .chains
            .adapter_for(chain_id)
            .map_err(RegistrarError::Chain)?;

        match adapter.get_transaction_count(agent_address).await {
            Ok(account_nonce) if account_nonce != authorization.account_nonce => {
                diagnostics.push(RegistrationDiagnostic::NonceMismatch {
                    account_nonce,
                    authorization_nonce: authorization.account_nonce,
                });
            }
            Ok(_) => {}
            Err(reason) => diagnostics.push(RegistrationDiagnostic::NonceUnavailable { reason }),
        }

        for diagnostic in &diagnostics {
            log::warn!("[Registrar] {}: {}", lowercase_hex(&agent_address), diagnostic);
        }

        let calldata = Bytes::from(encode_register(&intent));
        log::info!(
            "[Registrar] Submitting {} for {} on chain {} (registry {:?}, uri {:?})",
            intent.label(),
            lowercase_hex(&agent_address),
            chain_id,
            registry,
            intent.token_uri().unwrap_or("")
        );
        if let RegistrationIntent::WithMetadata { metadata, .. } = &intent {
            for entry in metadata {
                log::debug!(
                    "[Registrar]   metadata {} = {}",
                    entry.key,
                    entry.value_text().unwrap_or_else(|| entry.value_hex())
                );
            }
        }

        let transaction_hash = adapter
            .send_transaction(agent_address, calldata, std::slice::from_ref(&authorization))
            .await
            .map_err(RegistrarError::Chain)?;

        let receipt = adapter
            .wait_for_receipt(transaction_hash, cancel)
            .await
            .map_err(|reason| RegistrarError::ConfirmationFailed {
                transaction_hash,
                reason,
            })?;

        if !receipt.status {
            log::error!(
                "[Registrar] Registration tx {:?} reverted on chain {}",
                transaction_hash,
                chain_id
            );
            return Err(RegistrarError::Reverted {
                chain_id,
                transaction_hash,
            });
        }

        let decoded = extract_agent_id(&receipt.logs, registry);
        match decoded {
            Some((agent_id, source)) => {
                log::info!(
                    "[Registrar] {} registered as agent {} ({}) in tx {:?}, block {:?}",
                    lowercase_hex(&agent_address),
                    agent_id,
                    source.as_str(),
                    transaction_hash,
                    receipt.block_number
                );
                self.ledger
                    .record_registration(&AgentRegistrationRecord {
                        agent_address: agent_address.into(),
                        agent_id: agent_id.into(),
                        chain_id,
                        transaction_hash: format!("{:?}", transaction_hash),
                        registered_at: Utc::now(),
                    })
                    .await;
            }
            None => {
                log::warn!(
                    "[Registrar] Tx {:?} confirmed but agent id could not be decoded",
                    transaction_hash
                );
                diagnostics.push(RegistrationDiagnostic::AgentIdUndecoded);
            }
        }

        Ok(RegistrationOutcome::Confirmed {
            chain_id,
            transaction_hash,
            agent_id: decoded.map(|(id, _)| id),
            agent_id_source: decoded.map(|(_, source)| source),
            diagnostics,
        })
    }
}

/// Holds one request's claim on an agent's lease. Dropping it, including when
/// the request future is abandoned mid-flight, removes the map entry once no
/// other request holds or waits on it.
struct Lease<'a> {
    leases: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    mutex: Arc<Mutex<()>>,
}

impl<'a> Lease<'a> {
    fn acquire(leases: &'a DashMap<String, Arc<Mutex<()>>>, key: String) -> Self {
        let mutex = leases
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        Self { leases, key, mutex }
    }

    async fn lock(&self) -> MutexGuard<'_, ()> {
        self.mutex.lock().await
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        // Map entry + ours; anything more means another request holds a clone
        self.leases
            .remove_if(&self.key, |_, l| Arc::strong_count(l) == 2);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::chain::{ChainAdapter, TxLog, TxReceipt};
    use crate::eip8004::abi::identity::tests::{mint_log, registered_log};
    use crate::eip8004::abi::function_selector;
    use crate::eip8004::delegation::tests::{sample_authorization, DELEGATE_CHECKSUMMED, OTHER_DELEGATE};
    use crate::eip8004::types::MetadataEntry;
    use crate::ledger::MemoryStore;
    use async_trait::async_trait;
    use ethers::abi::{ParamType, Token};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    const AGENT: &str = "0x00000000000000000000000000000000000a6e17";
    const TESTNET_REGISTRY: &str = "0x8004A818BFB912233c491871b3d84c89A494BD9e";

    #[derive(Debug, Clone, PartialEq)]
    pub enum ChainCall {
        TransactionCount(Address),
        Read(Address),
        Send {
            to: Address,
            data: Vec<u8>,
            authorizations: Vec<DelegationAuthorization>,
        },
        WaitReceipt(H256),
    }

    /// Records every call; answers from canned values
    pub struct MockChain {
        pub chain_id: u64,
        pub calls: StdMutex<Vec<ChainCall>>,
        pub account_nonce: u64,
        pub receipt_status: bool,
        pub logs: Vec<TxLog>,
        pub read_response: Vec<u8>,
        pub send_delay: Duration,
    }

    impl MockChain {
        pub fn new(logs: Vec<TxLog>) -> Self {
            Self {
                chain_id: 84532,
                calls: StdMutex::new(Vec::new()),
                account_nonce: 0,
                receipt_status: true,
                logs,
                read_response: Vec::new(),
                send_delay: Duration::ZERO,
            }
        }

        pub fn calls(&self) -> Vec<ChainCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn sends(&self) -> Vec<ChainCall> {
            self.calls()
                .into_iter()
                .filter(|c| matches!(c, ChainCall::Send { .. }))
                .collect()
        }
    }

    #[async_trait]
    impl ChainAdapter for MockChain {
        fn chain_id(&self) -> u64 {
            self.chain_id
        }

        async fn get_transaction_count(&self, address: Address) -> Result<u64, String> {
            self.calls.lock().unwrap().push(ChainCall::TransactionCount(address));
            Ok(self.account_nonce)
        }

        async fn call_contract_read(&self, to: Address, _calldata: Bytes) -> Result<Bytes, String> {
            self.calls.lock().unwrap().push(ChainCall::Read(to));
            Ok(Bytes::from(self.read_response.clone()))
        }

        async fn send_transaction(
            &self,
            to: Address,
            data: Bytes,
            authorization_list: &[DelegationAuthorization],
        ) -> Result<H256, String> {
            self.calls.lock().unwrap().push(ChainCall::Send {
                to,
                data: data.to_vec(),
                authorizations: authorization_list.to_vec(),
            });
            if !self.send_delay.is_zero() {
                tokio::time::sleep(self.send_delay).await;
            }
            Ok(H256::repeat_byte(0xab))
        }

        async fn wait_for_receipt(
            &self,
            tx_hash: H256,
            cancel: &CancellationToken,
        ) -> Result<TxReceipt, String> {
            self.calls.lock().unwrap().push(ChainCall::WaitReceipt(tx_hash));
            if cancel.is_cancelled() {
                return Err("receipt wait cancelled".to_string());
            }
            Ok(TxReceipt {
                transaction_hash: tx_hash,
                status: self.receipt_status,
                block_number: Some(1),
                logs: self.logs.clone(),
            })
        }
    }

    pub struct MockFactory(pub Arc<MockChain>);

    impl ChainAdapterFactory for MockFactory {
        fn adapter_for(&self, _chain_id: u64) -> Result<Arc<dyn ChainAdapter>, String> {
            Ok(self.0.clone())
        }
    }

    fn agent() -> Address {
        AGENT.parse().unwrap()
    }

    fn registry() -> Address {
        TESTNET_REGISTRY.parse().unwrap()
    }

    fn registrar_with(delegate: &str, chain: Arc<MockChain>) -> (AgentRegistrar, RegistrationLedger) {
        let networks = NetworkRegistry::from_vars(vec![
            ("DELEGATE_CONTRACT_84532", delegate),
            ("DELEGATE_CONTRACT_11155111", delegate),
        ]);
        let ledger = RegistrationLedger::new(Arc::new(MemoryStore::new()));
        let registrar = AgentRegistrar::new(
            Arc::new(networks),
            Arc::new(MockFactory(chain)),
            ledger.clone(),
        );
        (registrar, ledger)
    }

    fn request(intent: RegistrationIntent) -> RegistrationRequest {
        RegistrationRequest {
            agent_address: agent(),
            authorization: sample_authorization(84532, DELEGATE_CHECKSUMMED, 0),
            intent,
            network: None,
        }
    }

    fn uri_intent() -> RegistrationIntent {
        RegistrationIntent::WithUri {
            token_uri: "ipfs://x".into(),
        }
    }

    #[tokio::test]
    async fn test_case_insensitive_delegate_submits_one_authorization() {
        let chain = Arc::new(MockChain::new(vec![registered_log(registry(), 42, agent())]));
        let (registrar, ledger) = registrar_with(&DELEGATE_CHECKSUMMED.to_lowercase(), chain.clone());

        let outcome = registrar
            .register(request(uri_intent()), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.agent_id(), Some(U256::from(42u64)));

        let sends = chain.sends();
        assert_eq!(sends.len(), 1);
        let ChainCall::Send { to, data, authorizations } = &sends[0] else {
            unreachable!()
        };
        assert_eq!(*to, agent());
        assert_eq!(authorizations.len(), 1);
        assert_eq!(data[..4], function_selector("register(string)"));
        let args = ethers::abi::decode(&[ParamType::String], &data[4..]).unwrap();
        assert_eq!(args, vec![Token::String("ipfs://x".into())]);

        let record = ledger.registration(84532, &agent()).await.unwrap();
        assert_eq!(record.agent_id.0, U256::from(42u64));
        assert_eq!(record.chain_id, 84532);
    }

    #[tokio::test]
    async fn test_delegate_mismatch_makes_no_chain_calls() {
        let chain = Arc::new(MockChain::new(vec![]));
        let (registrar, _) = registrar_with(OTHER_DELEGATE, chain.clone());

        let err = registrar
            .register(request(uri_intent()), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RegistrarError::Delegation(DelegationError::DelegateMismatch { chain_id: 84532, .. })
        ));
        assert!(err.to_string().contains(OTHER_DELEGATE));
        assert!(chain.calls().is_empty());
    }

    #[tokio::test]
    async fn test_existing_record_short_circuits() {
        let chain = Arc::new(MockChain::new(vec![]));
        let (registrar, ledger) = registrar_with(DELEGATE_CHECKSUMMED, chain.clone());

        let existing = AgentRegistrationRecord {
            agent_address: agent().into(),
            agent_id: U256::from(5u64).into(),
            chain_id: 84532,
            transaction_hash: "0x01".into(),
            registered_at: Utc::now(),
        };
        ledger.record_registration(&existing).await;

        let outcome = registrar
            .register(request(RegistrationIntent::Bare), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, RegistrationOutcome::AlreadyRegistered(existing));
        assert!(chain.calls().is_empty());
    }

    #[tokio::test]
    async fn test_mint_transfer_fallback_ignores_foreign_logs() {
        let foreign = Address::repeat_byte(0x99);
        let chain = Arc::new(MockChain::new(vec![
            registered_log(foreign, 1, agent()),
            mint_log(foreign, agent(), 2),
            mint_log(registry(), agent(), 77),
        ]));
        let (registrar, ledger) = registrar_with(DELEGATE_CHECKSUMMED, chain);

        let outcome = registrar
            .register(request(RegistrationIntent::Bare), &CancellationToken::new())
            .await
            .unwrap();

        let RegistrationOutcome::Confirmed { agent_id, agent_id_source, .. } = outcome else {
            panic!("expected confirmation");
        };
        assert_eq!(agent_id, Some(U256::from(77u64)));
        assert_eq!(agent_id_source, Some(AgentIdSource::MintTransfer));
        assert!(ledger.registration(84532, &agent()).await.is_some());
    }

    #[tokio::test]
    async fn test_undecodable_id_is_still_success() {
        let chain = Arc::new(MockChain::new(vec![mint_log(Address::repeat_byte(0x99), agent(), 2)]));
        let (registrar, ledger) = registrar_with(DELEGATE_CHECKSUMMED, chain);

        let outcome = registrar
            .register(request(uri_intent()), &CancellationToken::new())
            .await
            .unwrap();

        let RegistrationOutcome::Confirmed { agent_id, diagnostics, transaction_hash, .. } = outcome else {
            panic!("expected confirmation");
        };
        assert_eq!(agent_id, None);
        assert_eq!(transaction_hash, H256::repeat_byte(0xab));
        assert!(diagnostics.contains(&RegistrationDiagnostic::AgentIdUndecoded));
        assert!(ledger.registration(84532, &agent()).await.is_none());
    }

    #[tokio::test]
    async fn test_nonce_mismatch_is_only_a_diagnostic() {
        let mut mock = MockChain::new(vec![registered_log(registry(), 3, agent())]);
        mock.account_nonce = 9;
        let chain = Arc::new(mock);
        let (registrar, _) = registrar_with(DELEGATE_CHECKSUMMED, chain.clone());

        let outcome = registrar
            .register(request(RegistrationIntent::Bare), &CancellationToken::new())
            .await
            .unwrap();

        let RegistrationOutcome::Confirmed { diagnostics, .. } = outcome else {
            panic!("expected confirmation");
        };
        assert!(diagnostics.contains(&RegistrationDiagnostic::NonceMismatch {
            account_nonce: 9,
            authorization_nonce: 0,
        }));
        assert_eq!(chain.sends().len(), 1);
    }

    #[tokio::test]
    async fn test_revert_is_failure_and_not_recorded() {
        let mut mock = MockChain::new(vec![registered_log(registry(), 3, agent())]);
        mock.receipt_status = false;
        let (registrar, ledger) = registrar_with(DELEGATE_CHECKSUMMED, Arc::new(mock));

        let err = registrar
            .register(request(RegistrationIntent::Bare), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrarError::Reverted { chain_id: 84532, .. }));
        assert!(ledger.registration(84532, &agent()).await.is_none());
    }

    #[tokio::test]
    async fn test_cancellation_reaches_receipt_wait() {
        let chain = Arc::new(MockChain::new(vec![]));
        let (registrar, _) = registrar_with(DELEGATE_CHECKSUMMED, chain);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = registrar
            .register(request(RegistrationIntent::Bare), &cancel)
            .await
            .unwrap_err();
        let RegistrarError::ConfirmationFailed { reason, .. } = err else {
            panic!("expected confirmation failure, got {:?}", err);
        };
        assert_eq!(reason, "receipt wait cancelled");
    }

    #[tokio::test]
    async fn test_network_hint_overrides_authorization_chain() {
        let chain = Arc::new(MockChain::new(vec![]));
        let (registrar, _) = registrar_with(DELEGATE_CHECKSUMMED, chain.clone());

        let mut req = request(RegistrationIntent::Bare);
        req.network = Some("base".into());
        let err = registrar
            .register(req, &CancellationToken::new())
            .await
            .unwrap_err();

        // base (8453) has a registry but no delegate configured
        assert_eq!(
            err,
            RegistrarError::Configuration(NetworkError::DelegateNotConfigured { chain_id: 8453 })
        );
        assert!(chain.calls().is_empty());
    }

    #[tokio::test]
    async fn test_metadata_intent_is_encoded() {
        let chain = Arc::new(MockChain::new(vec![registered_log(registry(), 1, agent())]));
        let (registrar, _) = registrar_with(DELEGATE_CHECKSUMMED, chain.clone());

        let intent = RegistrationIntent::WithMetadata {
            token_uri: "ipfs://x".into(),
            metadata: vec![MetadataEntry::from_input("name", "bot").unwrap()],
        };
        registrar
            .register(request(intent), &CancellationToken::new())
            .await
            .unwrap();

        let ChainCall::Send { data, .. } = &chain.sends()[0] else {
            unreachable!()
        };
        assert_eq!(data[..4], function_selector("register(string,(string,bytes)[])"));
    }

    #[tokio::test]
    async fn test_concurrent_requests_for_one_agent_submit_once() {
        let mut mock = MockChain::new(vec![registered_log(registry(), 8, agent())]);
        mock.send_delay = Duration::from_millis(50);
        let chain = Arc::new(mock);
        let (registrar, _) = registrar_with(DELEGATE_CHECKSUMMED, chain.clone());
        let registrar = Arc::new(registrar);

        let cancel = CancellationToken::new();
        let (a, b) = tokio::join!(
            registrar.register(request(RegistrationIntent::Bare), &cancel),
            registrar.register(request(RegistrationIntent::Bare), &cancel),
        );

        let outcomes = [a.unwrap(), b.unwrap()];
        assert_eq!(chain.sends().len(), 1);
        assert!(outcomes
            .iter()
            .any(|o| matches!(o, RegistrationOutcome::AlreadyRegistered(_))));
        assert!(outcomes.iter().all(|o| o.agent_id() == Some(U256::from(8u64))));
        assert!(registrar.leases.is_empty());
    }

    #[tokio::test]
    async fn test_same_agent_registers_separately_per_chain() {
        let chain = Arc::new(MockChain::new(vec![registered_log(registry(), 4, agent())]));
        let (registrar, ledger) = registrar_with(DELEGATE_CHECKSUMMED, chain.clone());

        registrar
            .register(request(RegistrationIntent::Bare), &CancellationToken::new())
            .await
            .unwrap();

        let mut sepolia = request(RegistrationIntent::Bare);
        sepolia.authorization = sample_authorization(11155111, DELEGATE_CHECKSUMMED, 0);
        sepolia.network = Some("sepolia".into());
        let outcome = registrar
            .register(sepolia, &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(outcome, RegistrationOutcome::Confirmed { chain_id: 11155111, .. }));
        assert_eq!(chain.sends().len(), 2);
        assert_eq!(ledger.registration(84532, &agent()).await.unwrap().chain_id, 84532);
        assert_eq!(ledger.registration(11155111, &agent()).await.unwrap().chain_id, 11155111);
    }

    #[tokio::test]
    async fn test_abandoned_requests_release_their_leases() {
        let mut mock = MockChain::new(vec![]);
        mock.send_delay = Duration::from_secs(5);
        let chain = Arc::new(mock);
        let (registrar, _) = registrar_with(DELEGATE_CHECKSUMMED, chain.clone());
        let cancel = CancellationToken::new();

        for i in 1..=50u64 {
            let mut req = request(RegistrationIntent::Bare);
            req.agent_address = Address::from_low_u64_be(i);
            let result =
                tokio::time::timeout(Duration::from_millis(5), registrar.register(req, &cancel)).await;
            assert!(result.is_err());
        }

        assert_eq!(chain.sends().len(), 50);
        assert!(registrar.leases.is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_waiter_keeps_holder_lease_until_done() {
        let mut mock = MockChain::new(vec![registered_log(registry(), 8, agent())]);
        mock.send_delay = Duration::from_millis(50);
        let chain = Arc::new(mock);
        let (registrar, _) = registrar_with(DELEGATE_CHECKSUMMED, chain.clone());
        let cancel = CancellationToken::new();

        let (holder, waiter) = tokio::join!(
            registrar.register(request(RegistrationIntent::Bare), &cancel),
            tokio::time::timeout(
                Duration::from_millis(5),
                registrar.register(request(RegistrationIntent::Bare), &cancel),
            ),
        );

        assert!(holder.is_ok());
        assert!(waiter.is_err());
        assert_eq!(chain.sends().len(), 1);
        assert!(registrar.leases.is_empty());
    }
}
